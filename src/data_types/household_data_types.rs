use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{BUDGET_CATEGORIES, FALLBACK_BUDGET_CATEGORY};
use crate::document::{
    as_object, date_field, date_key, opt_string_field, quantity_field, required_string_field,
    string_field, timestamp_field, FromDocument, ToDocument,
};
use crate::errors::DocumentParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct HouseholdMember {
    pub id: String,
    pub name: String,
    pub age: Option<u32>,
    pub preferences: Option<String>,
    pub sex: Option<String>,
    pub position: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Expense,
    Income,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetEntry {
    pub id: String,
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetSummary {
    pub total_expenses: f64,
    pub total_income: f64,
    pub expenses_by_category: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MealHistoryEntry {
    pub id: String,
    pub dish_id: String,
    pub dish_name: String,
    pub prepared_on: NaiveDate,
    pub portions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedAiContent {
    pub id: String,
    pub title: String,
    pub content: String,
    pub feature_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

fn small_count(doc: &serde_json::Map<String, Value>, key: &str) -> Option<u32> {
    doc.get(key)?.as_u64().and_then(|n| u32::try_from(n).ok())
}

impl FromDocument for HouseholdMember {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError> {
        let obj = as_object(id, doc)?;
        Ok(HouseholdMember {
            id: id.to_string(),
            name: required_string_field(id, obj, "nom")?,
            age: small_count(obj, "age"),
            preferences: opt_string_field(obj, "preferences"),
            sex: opt_string_field(obj, "sexe"),
            position: opt_string_field(obj, "position"),
        })
    }
}

impl ToDocument for HouseholdMember {
    fn to_document(&self) -> Value {
        json!({
            "nom": self.name,
            "age": self.age,
            "preferences": self.preferences,
            "sexe": self.sex,
            "position": self.position,
        })
    }
}

/// Known category, or the fallback bucket.
pub fn normalize_category(raw: &str) -> &'static str {
    let wanted = raw.trim().to_lowercase();
    BUDGET_CATEGORIES
        .iter()
        .find(|c| c.to_lowercase() == wanted)
        .copied()
        .unwrap_or(FALLBACK_BUDGET_CATEGORY)
}

impl FromDocument for BudgetEntry {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError> {
        let obj = as_object(id, doc)?;
        let kind = match string_field(obj, "type").as_str() {
            "income" => EntryKind::Income,
            _ => EntryKind::Expense,
        };
        let date = date_field(obj, "date").ok_or_else(|| DocumentParseError::MissingField {
            id: id.to_string(),
            field: "date",
        })?;

        Ok(BudgetEntry {
            id: id.to_string(),
            amount: quantity_field(obj, "amount"),
            category: normalize_category(&string_field(obj, "category")).to_string(),
            description: string_field(obj, "description").trim().to_string(),
            date,
            kind,
        })
    }
}

impl ToDocument for BudgetEntry {
    fn to_document(&self) -> Value {
        json!({
            "amount": self.amount,
            "category": self.category,
            "description": self.description,
            "date": date_key(self.date),
            "type": self.kind,
        })
    }
}

impl BudgetSummary {
    /// Totals of the entries dated in the given month.
    pub fn for_month(entries: &[BudgetEntry], year: i32, month: u32) -> Self {
        let mut summary = BudgetSummary::default();

        for entry in entries
            .iter()
            .filter(|e| e.date.year() == year && e.date.month() == month)
        {
            match entry.kind {
                EntryKind::Expense => {
                    summary.total_expenses += entry.amount;
                    *summary
                        .expenses_by_category
                        .entry(entry.category.clone())
                        .or_insert(0.0) += entry.amount;
                }
                EntryKind::Income => summary.total_income += entry.amount,
            }
        }

        summary
    }

    pub fn balance(&self) -> f64 {
        self.total_income - self.total_expenses
    }
}

impl FromDocument for MealHistoryEntry {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError> {
        let obj = as_object(id, doc)?;
        Ok(MealHistoryEntry {
            id: id.to_string(),
            dish_id: required_string_field(id, obj, "platId")?,
            dish_name: string_field(obj, "nomPlat"),
            prepared_on: date_field(obj, "datePreparation").ok_or_else(|| {
                DocumentParseError::MissingField {
                    id: id.to_string(),
                    field: "datePreparation",
                }
            })?,
            portions: small_count(obj, "portionsPreparees"),
        })
    }
}

impl ToDocument for MealHistoryEntry {
    fn to_document(&self) -> Value {
        json!({
            "platId": self.dish_id,
            "nomPlat": self.dish_name,
            "datePreparation": date_key(self.prepared_on),
            "portionsPreparees": self.portions,
        })
    }
}

impl FromDocument for SavedAiContent {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError> {
        let obj = as_object(id, doc)?;
        Ok(SavedAiContent {
            id: id.to_string(),
            title: string_field(obj, "title"),
            content: required_string_field(id, obj, "content")?,
            feature_id: string_field(obj, "featureId"),
            created_at: timestamp_field(obj, "createdAt"),
        })
    }
}

impl ToDocument for SavedAiContent {
    fn to_document(&self) -> Value {
        let mut doc = json!({
            "title": self.title,
            "content": self.content,
            "featureId": self.feature_id,
        });
        if let Some(created_at) = self.created_at {
            doc["createdAt"] = Value::String(created_at.to_rfc3339());
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(amount: f64, category: &str, date: (i32, u32, u32), kind: EntryKind) -> BudgetEntry {
        BudgetEntry {
            id: String::new(),
            amount,
            category: category.to_string(),
            description: "x".to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            kind,
        }
    }

    #[test]
    fn month_summary_only_counts_that_month() {
        let entries = vec![
            entry(12.5, "Épicerie", (2026, 10, 2), EntryKind::Expense),
            entry(7.5, "Épicerie", (2026, 10, 20), EntryKind::Expense),
            entry(30.0, "Restaurant", (2026, 10, 11), EntryKind::Expense),
            entry(99.0, "Restaurant", (2026, 9, 30), EntryKind::Expense),
            entry(100.0, "Autres", (2026, 10, 1), EntryKind::Income),
        ];
        let summary = BudgetSummary::for_month(&entries, 2026, 10);

        assert_eq!(summary.total_expenses, 50.0);
        assert_eq!(summary.total_income, 100.0);
        assert_eq!(summary.expenses_by_category["Épicerie"], 20.0);
        assert_eq!(summary.expenses_by_category["Restaurant"], 30.0);
        assert!(!summary.expenses_by_category.contains_key("Autres"));
        assert_eq!(summary.balance(), 50.0);
    }

    #[test]
    fn unknown_category_falls_back() {
        assert_eq!(normalize_category("restaurant"), "Restaurant");
        assert_eq!(normalize_category(" épicerie "), "Épicerie");
        assert_eq!(normalize_category("ÉPICERIE"), "Épicerie");
        assert_eq!(normalize_category("Cinéma"), "Autres");
    }

    #[test]
    fn budget_entry_reads_loose_amount() {
        let doc = json!({
            "amount": "12.40",
            "category": "Boissons",
            "description": " Jus ",
            "date": "2026-10-03T08:00:00+00:00",
            "type": "expense",
        });
        let entry = BudgetEntry::from_document("b1", &doc).unwrap();
        assert_eq!(entry.amount, 12.4);
        assert_eq!(entry.description, "Jus");
        assert_eq!(entry.kind, EntryKind::Expense);
    }

    #[test]
    fn member_optional_fields() {
        let doc = json!({ "nom": "Léa", "age": 7, "preferences": "" });
        let member = HouseholdMember::from_document("m1", &doc).unwrap();
        assert_eq!(member.age, Some(7));
        assert_eq!(member.preferences, None);
    }
}
