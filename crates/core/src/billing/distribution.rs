use crate::billing::{monthly_amount, round_cents};
use crate::domain::subscription::{display_label, Subscription};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub label: String,
    pub monthly_total: f64,
}

/// Monthly spend per category, in first-seen category order. Totals are summed first and then
/// rounded to cents.
pub fn group_monthly_by_category(subs: &[Subscription]) -> Vec<CategoryTotal> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut sums: Vec<(&str, f64)> = Vec::new();

    for sub in subs {
        let amount = monthly_amount(sub);
        match index.get(sub.category.as_str()).copied() {
            Some(i) => sums[i].1 += amount,
            None => {
                index.insert(sub.category.as_str(), sums.len());
                sums.push((sub.category.as_str(), amount));
            }
        }
    }

    sums.into_iter()
        .map(|(category, total)| CategoryTotal {
            category: category.to_string(),
            label: display_label(category),
            monthly_total: round_cents(total),
        })
        .collect()
}
