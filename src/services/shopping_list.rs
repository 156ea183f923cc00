//! Shopping list rendering
//!
//! Turns the aggregated cart totals into the plain-text file users download.

use crate::models::IngredientTotal;

/// First line of every shopping list
pub const HEADER: &str = "Shopping list:";

/// Render totals as text: a header, a blank line, then `name (unit): total`
/// per ingredient in the order given. An empty cart renders just the header.
pub fn render_shopping_list(totals: &[IngredientTotal]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    if totals.is_empty() {
        return out;
    }

    out.push('\n');
    for item in totals {
        out.push_str(&format!(
            "{} ({}): {}\n",
            item.name, item.measurement_unit, item.total
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::models::Amount;

    fn total(name: &str, unit: &str, hundredths: i64) -> IngredientTotal {
        IngredientTotal {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            total: Amount::from_hundredths(hundredths),
        }
    }

    #[test]
    fn test_empty_cart_is_header_only() {
        assert_eq!(render_shopping_list(&[]), "Shopping list:\n");
    }

    #[test]
    fn test_renders_one_line_per_ingredient() {
        let text = render_shopping_list(&[total("flour", "g", 15000), total("egg", "pcs", 200)]);
        assert_eq!(text, "Shopping list:\n\nflour (g): 150\negg (pcs): 2\n");
    }

    #[test]
    fn test_renders_fractional_totals() {
        let text = render_shopping_list(&[total("butter", "kg", 175), total("milk", "l", 50)]);
        assert_eq!(text, "Shopping list:\n\nbutter (kg): 1.75\nmilk (l): 0.5\n");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_line_count_matches_items(
            items in prop::collection::vec(("[a-z]{1,12}", "[a-z]{1,4}", 1i64..1_000_000), 1..15)
        ) {
            let totals: Vec<_> = items
                .iter()
                .map(|(name, unit, amount)| total(name, unit, *amount))
                .collect();
            let text = render_shopping_list(&totals);
            let lines: Vec<_> = text.lines().collect();

            prop_assert_eq!(lines[0], HEADER);
            prop_assert_eq!(lines[1], "");
            prop_assert_eq!(lines.len(), totals.len() + 2);
            for (line, item) in lines[2..].iter().zip(&totals) {
                let expected = format!("{} ({}): {}", item.name, item.measurement_unit, item.total);
                prop_assert_eq!(*line, expected.as_str());
            }
        }
    }
}
