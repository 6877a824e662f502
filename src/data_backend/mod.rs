//! Typed collections on top of the document store.
//!
//! The shopping list generator only talks to the four traits below; the
//! SQLite [`Database`](crate::db_operations::Database) implements all of them.

use chrono::NaiveDate;

use crate::data_types::{Dish, MealPlanDay, ShoppingList, ShoppingListItem, StockItem, UserContext};
use crate::errors::PlannerError;

pub mod household;
pub mod kitchen;
pub mod shopping_lists;

pub use shopping_lists::ListSubscription;

pub trait MealPlanSource {
    /// `None` when nothing was ever planned for that day.
    fn plan_for_day(
        &self,
        user: &UserContext,
        date: NaiveDate,
    ) -> Result<Option<MealPlanDay>, PlannerError>;
}

pub trait DishCatalog {
    /// Dishes in the order of `ids`, repeated ids yield repeated dishes.
    fn dishes_by_ids(&self, user: &UserContext, ids: &[String]) -> Result<Vec<Dish>, PlannerError>;
}

pub trait StockLedger {
    fn current_stock(&self, user: &UserContext) -> Result<Vec<StockItem>, PlannerError>;
}

pub trait ShoppingListStore {
    fn create_list(
        &self,
        user: &UserContext,
        name: &str,
        items: Vec<ShoppingListItem>,
    ) -> Result<String, PlannerError>;

    fn get_list(&self, user: &UserContext, list_id: &str)
        -> Result<Option<ShoppingList>, PlannerError>;

    fn subscribe_list(
        &self,
        user: &UserContext,
        list_id: &str,
    ) -> Result<ListSubscription, PlannerError>;

    /// Full replace of the item array. Last writer wins.
    fn update_items(
        &self,
        user: &UserContext,
        list_id: &str,
        items: Vec<ShoppingListItem>,
    ) -> Result<ShoppingList, PlannerError>;

    /// Owner only.
    fn delete_list(&self, user: &UserContext, list_id: &str) -> Result<(), PlannerError>;
}
