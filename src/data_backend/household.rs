use chrono::{NaiveDate, Utc};

use super::kitchen::parse_all;

use crate::{
    constants::{BUDGET_ENTRIES, HOUSEHOLD, MEAL_HISTORY, SAVED_MEAL_PLANS, SAVED_RECIPES},
    data_types::{
        household_data_types::normalize_category, BudgetEntry, EntryKind, HouseholdMember,
        MealHistoryEntry, SavedAiContent, UserContext,
    },
    db_operations::Database,
    document::{parse_quantity, FromDocument, ToDocument},
    errors::PlannerError,
};

fn parse_collection<T: FromDocument>(
    db: &Database,
    collection: &str,
) -> Result<Vec<T>, PlannerError> {
    Ok(parse_all(collection, db.list_documents(collection)?))
}

fn delete_or_not_found(
    db: &Database,
    collection: &str,
    kind: &'static str,
    id: &str,
) -> Result<(), PlannerError> {
    if !db.delete_document(collection, id)? {
        return Err(PlannerError::not_found(kind, id));
    }
    Ok(())
}

impl Database {
    /// Adds a member, or replaces one when `member.id` is set.
    pub fn save_member(
        &self,
        user: &UserContext,
        member: &HouseholdMember,
    ) -> Result<String, PlannerError> {
        if member.name.trim().is_empty() {
            return Err(PlannerError::MalformedInput("member name is empty".to_string()));
        }
        let mut member = member.clone();
        member.name = member.name.trim().to_string();

        let collection = user.collection(HOUSEHOLD);
        if member.id.is_empty() {
            return self.add_document(&collection, &member.to_document());
        }
        if self.get_document(&collection, &member.id)?.is_none() {
            return Err(PlannerError::not_found("household member", member.id.clone()));
        }
        self.set_document(&collection, &member.id, &member.to_document())?;
        Ok(member.id)
    }

    pub fn list_members(&self, user: &UserContext) -> Result<Vec<HouseholdMember>, PlannerError> {
        parse_collection(self, &user.collection(HOUSEHOLD))
    }

    pub fn delete_member(&self, user: &UserContext, id: &str) -> Result<(), PlannerError> {
        delete_or_not_found(self, &user.collection(HOUSEHOLD), "household member", id)
    }

    /// Records an expense. `amount` is user text and must read as a positive number.
    pub fn add_expense(
        &self,
        user: &UserContext,
        amount: &str,
        category: &str,
        description: &str,
        date: NaiveDate,
    ) -> Result<BudgetEntry, PlannerError> {
        let amount = parse_quantity(amount);
        if amount <= 0.0 {
            return Err(PlannerError::MalformedInput("amount must be positive".to_string()));
        }
        if description.trim().is_empty() {
            return Err(PlannerError::MalformedInput("description is empty".to_string()));
        }

        let mut entry = BudgetEntry {
            id: String::new(),
            amount,
            category: normalize_category(category).to_string(),
            description: description.trim().to_string(),
            date,
            kind: EntryKind::Expense,
        };
        entry.id = self.add_document(&user.collection(BUDGET_ENTRIES), &entry.to_document())?;
        Ok(entry)
    }

    /// Budget entries, newest first.
    pub fn list_budget_entries(&self, user: &UserContext) -> Result<Vec<BudgetEntry>, PlannerError> {
        let mut entries: Vec<BudgetEntry> = parse_collection(self, &user.collection(BUDGET_ENTRIES))?;
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(entries)
    }

    pub fn delete_budget_entry(&self, user: &UserContext, id: &str) -> Result<(), PlannerError> {
        delete_or_not_found(self, &user.collection(BUDGET_ENTRIES), "budget entry", id)
    }

    /// Logs that a dish was cooked. The dish has to exist.
    pub fn record_meal(
        &self,
        user: &UserContext,
        dish_id: &str,
        prepared_on: NaiveDate,
        portions: Option<u32>,
    ) -> Result<MealHistoryEntry, PlannerError> {
        let dish = self
            .get_dish(user, dish_id)?
            .ok_or_else(|| PlannerError::not_found("dish", dish_id))?;

        let mut entry = MealHistoryEntry {
            id: String::new(),
            dish_id: dish.id,
            dish_name: dish.name,
            prepared_on,
            portions,
        };
        entry.id = self.add_document(&user.collection(MEAL_HISTORY), &entry.to_document())?;
        Ok(entry)
    }

    pub fn meal_history(&self, user: &UserContext) -> Result<Vec<MealHistoryEntry>, PlannerError> {
        let mut entries: Vec<MealHistoryEntry> =
            parse_collection(self, &user.collection(MEAL_HISTORY))?;
        entries.sort_by(|a, b| b.prepared_on.cmp(&a.prepared_on));
        Ok(entries)
    }

    pub fn delete_meal_record(&self, user: &UserContext, id: &str) -> Result<(), PlannerError> {
        delete_or_not_found(self, &user.collection(MEAL_HISTORY), "meal record", id)
    }

    /// Keeps an assistant answer. Meal plans and recipes go to separate collections.
    pub fn save_ai_content(
        &self,
        user: &UserContext,
        feature_id: &str,
        title: &str,
        content: &str,
    ) -> Result<String, PlannerError> {
        if content.trim().is_empty() {
            return Err(PlannerError::MalformedInput("nothing to save".to_string()));
        }
        let record = SavedAiContent {
            id: String::new(),
            title: title.trim().to_string(),
            content: content.to_string(),
            feature_id: feature_id.to_string(),
            created_at: Some(Utc::now()),
        };
        self.add_document(
            &user.collection(saved_collection(feature_id)),
            &record.to_document(),
        )
    }

    pub fn saved_ai_content(
        &self,
        user: &UserContext,
        feature_id: &str,
    ) -> Result<Vec<SavedAiContent>, PlannerError> {
        let collection = user.collection(saved_collection(feature_id));
        Ok(self
            .list_documents(&collection)?
            .into_iter()
            .filter_map(|doc| {
                let mut record = SavedAiContent::from_document(&doc.id, &doc.data).ok()?;
                record.created_at = record.created_at.or(Some(doc.created_at));
                Some(record)
            })
            .filter(|r| r.feature_id == feature_id)
            .collect())
    }
}

fn saved_collection(feature_id: &str) -> &'static str {
    if feature_id == "meal-planning" {
        SAVED_MEAL_PLANS
    } else {
        SAVED_RECIPES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{BudgetSummary, Dish};

    fn setup() -> (Database, UserContext) {
        (
            Database::open_in_memory().unwrap(),
            UserContext::new("alice").unwrap(),
        )
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn member_add_update_delete() {
        let (db, user) = setup();
        let mut member = HouseholdMember {
            id: String::new(),
            name: "Léa".into(),
            age: Some(7),
            preferences: None,
            sex: None,
            position: Some("Enfant".into()),
        };
        member.id = db.save_member(&user, &member).unwrap();
        member.preferences = Some("pas de poisson".into());
        db.save_member(&user, &member).unwrap();

        let members = db.list_members(&user).unwrap();
        assert_eq!(members, vec![member.clone()]);

        db.delete_member(&user, &member.id).unwrap();
        assert!(matches!(
            db.delete_member(&user, &member.id),
            Err(PlannerError::NotFound { .. })
        ));
    }

    #[test]
    fn expenses_are_validated_and_summarized() {
        let (db, user) = setup();
        assert!(db.add_expense(&user, "abc", "Épicerie", "x", date(1)).is_err());
        assert!(db.add_expense(&user, "3", "Épicerie", " ", date(1)).is_err());

        db.add_expense(&user, "12.5", "Épicerie", "marché", date(3)).unwrap();
        db.add_expense(&user, "20", "Cinéma", "film", date(5)).unwrap();

        let entries = db.list_budget_entries(&user).unwrap();
        assert_eq!(entries[0].date, date(5));
        assert_eq!(entries[0].category, "Autres");

        let summary = BudgetSummary::for_month(&entries, 2026, 10);
        assert_eq!(summary.total_expenses, 32.5);
    }

    #[test]
    fn meal_history_needs_existing_dish() {
        let (db, user) = setup();
        assert!(matches!(
            db.record_meal(&user, "nope", date(2), None),
            Err(PlannerError::NotFound { .. })
        ));

        let id = db.create_dish(&user, &Dish::new("Gratin", vec![])).unwrap();
        db.record_meal(&user, &id, date(2), Some(4)).unwrap();
        db.record_meal(&user, &id, date(9), None).unwrap();

        let history = db.meal_history(&user).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].prepared_on, date(9));
        assert_eq!(history[1].portions, Some(4));
        assert_eq!(history[1].dish_name, "Gratin");
    }

    #[test]
    fn ai_content_is_filed_by_feature() {
        let (db, user) = setup();
        db.save_ai_content(&user, "smart-recipe", "Risotto", "Faire revenir...")
            .unwrap();
        db.save_ai_content(&user, "meal-planning", "Semaine", "Lundi: ...")
            .unwrap();

        let recipes = db.saved_ai_content(&user, "smart-recipe").unwrap();
        assert_eq!(recipes.len(), 1);
        assert!(recipes[0].created_at.is_some());
        assert_eq!(db.saved_ai_content(&user, "meal-planning").unwrap().len(), 1);
        assert!(db.save_ai_content(&user, "chat", "t", "  ").is_err());
    }
}
