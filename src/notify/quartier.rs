use once_cell::sync::Lazy;

/// Boroughs we recognize inside free-form addresses. Matching is
/// case-insensitive substring, so "3030 rue Masson, Rosemont" and
/// "rosemont" both resolve to "Rosemont".
static QUARTIERS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Rosemont",
        "Ville-Marie",
        "Plateau",
        "Centre-ville",
        "Outremont",
        "Verdun",
        "LaSalle",
        "Mercier",
        "Hochelaga",
        "Villeray",
        "Ahuntsic",
        "Côte-des-Neiges",
    ]
});

pub const QUARTIER_DEFAUT: &str = "Centre-ville";

/// Resolves a quartier from a raw location string.
///
/// Tries the known borough names first, then falls back to the segment
/// after the last comma ("123 rue X, Anjou" -> "Anjou"), and finally to
/// the downtown default so every event lands somewhere.
pub fn extraire_quartier(lieu: &str) -> String {
    let lower = lieu.to_lowercase();
    for quartier in QUARTIERS.iter() {
        if lower.contains(&quartier.to_lowercase()) {
            return (*quartier).to_string();
        }
    }
    if let Some((_, after)) = lieu.rsplit_once(',') {
        let after = after.trim();
        if !after.is_empty() {
            return after.to_string();
        }
    }
    QUARTIER_DEFAUT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_quartier_wins_over_comma_segment() {
        assert_eq!(extraire_quartier("3030 rue Masson, Rosemont, H1Y 1X9"), "Rosemont");
        assert_eq!(extraire_quartier("avenue du parc, plateau"), "Plateau");
    }

    #[test]
    fn falls_back_to_segment_after_last_comma() {
        assert_eq!(extraire_quartier("123 rue Principale, Anjou"), "Anjou");
    }

    #[test]
    fn defaults_to_centre_ville() {
        assert_eq!(extraire_quartier("coin sans indice"), "Centre-ville");
        assert_eq!(extraire_quartier("rue X,   "), "Centre-ville");
    }
}
