pub mod household_data_types;
pub mod kitchen_data_types;
pub mod list_data_types;

pub use household_data_types::{
    BudgetEntry, BudgetSummary, EntryKind, HouseholdMember, MealHistoryEntry, SavedAiContent,
};
pub use kitchen_data_types::{Dish, Ingredient, MealPlanDay, StockItem};
pub use list_data_types::{ShoppingList, ShoppingListItem};

use crate::errors::PlannerError;

/// The already-resolved caller identity. Every collaborator call is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserContext {
    user_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Result<Self, PlannerError> {
        let user_id = user_id.into().trim().to_string();
        if user_id.is_empty() {
            return Err(PlannerError::NotAuthenticated);
        }
        Ok(UserContext { user_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Path of one of this user's subcollections, e.g. `users/{uid}/stock`.
    pub fn collection(&self, name: &str) -> String {
        format!("users/{}/{}", self.user_id, name)
    }
}
