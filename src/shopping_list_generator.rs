use chrono::NaiveDate;
use std::time::Instant;

use crate::{
    data_backend::{DishCatalog, MealPlanSource, ShoppingListStore, StockLedger},
    data_types::{ShoppingListItem, UserContext},
    document::date_key,
    errors::PlannerError,
    shopping_list_aggregator::{aggregate, Aggregation},
};

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedList {
    pub list_id: String,
    pub name: String,
    pub items: Vec<ShoppingListItem>,
}

pub fn default_list_name(date: NaiveDate) -> String {
    format!("Courses du {}", date.format("%d/%m/%Y"))
}

/// What has to be bought for the dishes planned on `date`, without persisting anything.
///
/// The three reads are independent: stock may change between them, the
/// result is advisory only.
pub fn plan_purchases<S>(
    store: &S,
    user: Option<&UserContext>,
    date: NaiveDate,
) -> Result<Vec<ShoppingListItem>, PlannerError>
where
    S: MealPlanSource + DishCatalog + StockLedger,
{
    let user = user.ok_or(PlannerError::NotAuthenticated)?;
    let now = Instant::now();

    let dish_ids = store
        .plan_for_day(user, date)?
        .map(|day| day.dish_ids)
        .unwrap_or_default();
    if dish_ids.is_empty() {
        return Err(PlannerError::NoPlan(date_key(date)));
    }

    let dishes = store.dishes_by_ids(user, &dish_ids)?;
    if dishes.is_empty() {
        return Err(PlannerError::NoPlan(date_key(date)));
    }

    let stock = store.current_stock(user)?;
    log::debug!("collaborator reads for {}: {:.2?}", date_key(date), now.elapsed());

    match aggregate(&dishes, &stock) {
        Aggregation::NothingToBuy => Err(PlannerError::NothingToPurchase),
        Aggregation::ToBuy(items) => Ok(items),
    }
}

/// Computes the purchases for `date` and stores them as a new shopping list owned by `user`.
pub fn generate_for_date<S>(
    store: &S,
    user: Option<&UserContext>,
    date: NaiveDate,
    list_name: Option<&str>,
) -> Result<GeneratedList, PlannerError>
where
    S: MealPlanSource + DishCatalog + StockLedger + ShoppingListStore,
{
    let items = plan_purchases(store, user, date)?;
    let user = user.ok_or(PlannerError::NotAuthenticated)?;

    let name = match list_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => default_list_name(date),
    };
    let list_id = store.create_list(user, &name, items.clone())?;
    log::info!(
        "generated list {} for {} on {}: {} items",
        list_id,
        user.user_id(),
        date_key(date),
        items.len()
    );

    Ok(GeneratedList {
        list_id,
        name,
        items,
    })
}
