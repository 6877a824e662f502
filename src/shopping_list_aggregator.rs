//! Net shopping requirements from planned dishes and pantry stock.

use std::collections::HashMap;

use crate::data_types::{Dish, ShoppingListItem, StockItem};

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Stock covers every ingredient (or no dish listed any).
    NothingToBuy,
    ToBuy(Vec<ShoppingListItem>),
}

impl Aggregation {
    pub fn items(&self) -> &[ShoppingListItem] {
        match self {
            Aggregation::NothingToBuy => &[],
            Aggregation::ToBuy(items) => items,
        }
    }

    pub fn into_items(self) -> Vec<ShoppingListItem> {
        match self {
            Aggregation::NothingToBuy => Vec::new(),
            Aggregation::ToBuy(items) => items,
        }
    }
}

struct Needed {
    name: String,
    quantity: f64,
    unit: String,
}

/// Sums stay finite so they survive a trip through JSON.
fn saturating_add(a: f64, b: f64) -> f64 {
    f64::MAX.min(a + b)
}

fn match_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Sums every ingredient of `dishes` by case-insensitive name, subtracts what
/// `stock` holds under the same name and keeps the positive remainders.
///
/// Quantities under one name are added as plain numbers whatever their unit;
/// the unit of the first occurrence is kept. Ingredients without a name are
/// ignored. Output follows first-occurrence order and every item is unchecked.
pub fn aggregate(dishes: &[Dish], stock: &[StockItem]) -> Aggregation {
    let mut needed: Vec<Needed> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for ingredient in dishes.iter().flat_map(|d| d.ingredients.iter()) {
        let key = match_key(&ingredient.name);
        if key.is_empty() {
            continue;
        }
        match index.get(&key) {
            Some(&i) => needed[i].quantity = saturating_add(needed[i].quantity, ingredient.quantity),
            None => {
                index.insert(key, needed.len());
                needed.push(Needed {
                    name: ingredient.name.trim().to_string(),
                    quantity: ingredient.quantity,
                    unit: ingredient.unit.clone(),
                });
            }
        }
    }

    let mut on_hand: HashMap<String, f64> = HashMap::new();
    for item in stock {
        let held = on_hand.entry(match_key(&item.name)).or_insert(0.0);
        *held = saturating_add(*held, item.quantity);
    }

    let items: Vec<ShoppingListItem> = needed
        .into_iter()
        .filter_map(|n| {
            let held = on_hand.get(&match_key(&n.name)).copied().unwrap_or(0.0);
            let net = n.quantity - held;
            (net > 0.0).then(|| ShoppingListItem::new(n.name, net, n.unit))
        })
        .collect();

    log::debug!(
        "aggregated {} dishes against {} stock items: {} to buy",
        dishes.len(),
        stock.len(),
        items.len()
    );

    if items.is_empty() {
        Aggregation::NothingToBuy
    } else {
        Aggregation::ToBuy(items)
    }
}
