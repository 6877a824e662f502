use chrono::{Datelike, Duration, NaiveDate};
use serde_json::{json, Value};
use std::time::Instant;

use crate::{
    constants::{DISHES, MEAL_PLANS, STOCK},
    data_backend::{DishCatalog, MealPlanSource, StockLedger},
    data_types::{Dish, Ingredient, MealPlanDay, StockItem, UserContext},
    db_operations::{Database, StoredDocument},
    document::{date_key, parse_quantity, FromDocument, ToDocument},
    errors::PlannerError,
};

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub(super) fn parse_all<T: FromDocument>(collection: &str, docs: Vec<StoredDocument>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match T::from_document(&doc.id, &doc.data) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("skipping {}/{}: {}", collection, doc.id, e);
                None
            }
        })
        .collect()
}

fn clean_dish(dish: &Dish) -> Result<Dish, PlannerError> {
    let name = dish.name.trim();
    if name.is_empty() {
        return Err(PlannerError::MalformedInput("dish name is empty".to_string()));
    }
    let ingredients = dish
        .ingredients
        .iter()
        .filter(|i| !i.name.trim().is_empty())
        .map(|i| Ingredient::new(i.name.trim(), i.quantity, i.unit.trim()))
        .collect();

    Ok(Dish {
        id: dish.id.clone(),
        name: name.to_string(),
        ingredients,
    })
}

impl Database {
    pub fn create_dish(&self, user: &UserContext, dish: &Dish) -> Result<String, PlannerError> {
        let dish = clean_dish(dish)?;
        let id = self.add_document(&user.collection(DISHES), &dish.to_document())?;
        log::info!("{} created dish '{}' ({})", user.user_id(), dish.name, id);
        Ok(id)
    }

    pub fn update_dish(&self, user: &UserContext, dish: &Dish) -> Result<(), PlannerError> {
        let collection = user.collection(DISHES);
        if self.get_document(&collection, &dish.id)?.is_none() {
            return Err(PlannerError::not_found("dish", dish.id.clone()));
        }
        self.set_document(&collection, &dish.id, &clean_dish(dish)?.to_document())
    }

    /// Parses a raw document (e.g. an export of the mobile app) and stores it as a new dish.
    pub fn import_dish(&self, user: &UserContext, raw: &Value) -> Result<String, PlannerError> {
        let dish = Dish::from_document("import", raw)?;
        self.create_dish(user, &dish)
    }

    pub fn get_dish(&self, user: &UserContext, id: &str) -> Result<Option<Dish>, PlannerError> {
        self.get_document(&user.collection(DISHES), id)?
            .map(|doc| Dish::from_document(&doc.id, &doc.data).map_err(PlannerError::from))
            .transpose()
    }

    /// All dishes of the user, sorted by name.
    pub fn list_dishes(&self, user: &UserContext) -> Result<Vec<Dish>, PlannerError> {
        let collection = user.collection(DISHES);
        let mut dishes: Vec<Dish> = parse_all(&collection, self.list_documents(&collection)?);
        dishes.sort_by_key(|d| d.name.to_lowercase());
        Ok(dishes)
    }

    pub fn delete_dish(&self, user: &UserContext, id: &str) -> Result<(), PlannerError> {
        // meal plans keep their references, they are skipped when resolved
        if !self.delete_document(&user.collection(DISHES), id)? {
            return Err(PlannerError::not_found("dish", id));
        }
        Ok(())
    }

    pub fn add_stock_item(
        &self,
        user: &UserContext,
        name: &str,
        quantity: &str,
        unit: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<StockItem, PlannerError> {
        let (name, quantity, unit) = (name.trim(), quantity.trim(), unit.trim());
        if name.is_empty() || quantity.is_empty() || unit.is_empty() {
            return Err(PlannerError::MalformedInput(
                "stock items need a name, a quantity and a unit".to_string(),
            ));
        }

        let mut doc = json!({ "nom": name, "quantite": quantity, "unite": unit });
        if let Some(expiry) = expiry {
            doc["expiryDate"] = Value::String(date_key(expiry));
        }
        let id = self.add_document(&user.collection(STOCK), &doc)?;

        Ok(StockItem {
            id,
            name: name.to_string(),
            quantity: parse_quantity(quantity),
            unit: unit.to_string(),
            expiry,
        })
    }

    pub fn list_stock(&self, user: &UserContext) -> Result<Vec<StockItem>, PlannerError> {
        let collection = user.collection(STOCK);
        let mut items: Vec<StockItem> = parse_all(&collection, self.list_documents(&collection)?);
        items.sort_by_key(|i| i.name.to_lowercase());
        Ok(items)
    }

    pub fn delete_stock_item(&self, user: &UserContext, id: &str) -> Result<(), PlannerError> {
        if !self.delete_document(&user.collection(STOCK), id)? {
            return Err(PlannerError::not_found("stock item", id));
        }
        Ok(())
    }

    /// Items expiring on or before `today + days`, soonest first. Already expired items included.
    pub fn expiring_stock(
        &self,
        user: &UserContext,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<StockItem>, PlannerError> {
        let limit = today + Duration::days(days);
        let mut items: Vec<StockItem> = self
            .list_stock(user)?
            .into_iter()
            .filter(|i| i.expiry.is_some_and(|e| e <= limit))
            .collect();
        items.sort_by_key(|i| i.expiry);
        Ok(items)
    }

    /// Appends a dish to a day; the same dish may be planned twice.
    pub fn assign_dish(
        &self,
        user: &UserContext,
        date: NaiveDate,
        dish_id: &str,
    ) -> Result<MealPlanDay, PlannerError> {
        if self.get_dish(user, dish_id)?.is_none() {
            return Err(PlannerError::not_found("dish", dish_id));
        }

        let key = date_key(date);
        let written = self.upsert_document(
            &user.collection(MEAL_PLANS),
            &key,
            MealPlanDay::empty(date).to_document(),
            |doc| {
                let mut day = MealPlanDay::from_document(&key, doc)?;
                day.dish_ids.push(dish_id.to_string());
                *doc = day.to_document();
                Ok(())
            },
        )?;
        let day = MealPlanDay::from_document(&key, &written)?;
        log::info!("{} planned {} on {}", user.user_id(), dish_id, key);
        Ok(day)
    }

    /// Removes every occurrence of a dish from a day.
    pub fn remove_dish(
        &self,
        user: &UserContext,
        date: NaiveDate,
        dish_id: &str,
    ) -> Result<MealPlanDay, PlannerError> {
        let key = date_key(date);
        let updated = self.update_document(&user.collection(MEAL_PLANS), &key, |doc| {
            let mut day = MealPlanDay::from_document(&key, doc)?;
            day.dish_ids.retain(|id| id != dish_id);
            *doc = day.to_document();
            Ok(())
        })?;

        match updated {
            Some(doc) => Ok(MealPlanDay::from_document(&key, &doc)?),
            None => Ok(MealPlanDay::empty(date)),
        }
    }

    pub fn dish_ids_for(
        &self,
        user: &UserContext,
        date: NaiveDate,
    ) -> Result<Vec<String>, PlannerError> {
        Ok(self
            .plan_for_day(user, date)?
            .map(|day| day.dish_ids)
            .unwrap_or_default())
    }

    /// Seven days starting at the Monday of `date`'s week. Unplanned days are empty.
    pub fn week_plan(
        &self,
        user: &UserContext,
        date: NaiveDate,
    ) -> Result<Vec<MealPlanDay>, PlannerError> {
        let monday = week_start(date);
        (0..7)
            .map(|offset| {
                let day = monday + Duration::days(offset);
                Ok(self
                    .plan_for_day(user, day)?
                    .unwrap_or_else(|| MealPlanDay::empty(day)))
            })
            .collect()
    }
}

impl MealPlanSource for Database {
    fn plan_for_day(
        &self,
        user: &UserContext,
        date: NaiveDate,
    ) -> Result<Option<MealPlanDay>, PlannerError> {
        let key = date_key(date);
        self.get_document(&user.collection(MEAL_PLANS), &key)?
            .map(|doc| MealPlanDay::from_document(&doc.id, &doc.data).map_err(PlannerError::from))
            .transpose()
    }
}

impl DishCatalog for Database {
    fn dishes_by_ids(&self, user: &UserContext, ids: &[String]) -> Result<Vec<Dish>, PlannerError> {
        let now = Instant::now();
        let mut dishes = Vec::with_capacity(ids.len());

        for id in ids {
            match self.get_dish(user, id) {
                Ok(Some(dish)) => dishes.push(dish),
                Ok(None) => log::warn!("planned dish {} no longer exists, skipping", id),
                Err(PlannerError::Document(e)) => log::warn!("unreadable dish {}: {}", id, e),
                Err(e) => return Err(e),
            }
        }

        log::debug!("resolved {} dishes: {:.2?}", dishes.len(), now.elapsed());
        Ok(dishes)
    }
}

impl StockLedger for Database {
    fn current_stock(&self, user: &UserContext) -> Result<Vec<StockItem>, PlannerError> {
        let now = Instant::now();
        let collection = user.collection(STOCK);
        let items = parse_all(&collection, self.list_documents(&collection)?);
        log::debug!("read stock: {:.2?}", now.elapsed());
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, UserContext) {
        (
            Database::open_in_memory().unwrap(),
            UserContext::new("alice").unwrap(),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_starts_on_monday() {
        assert_eq!(week_start(date(2026, 10, 18)), date(2026, 10, 12));
        assert_eq!(week_start(date(2026, 10, 12)), date(2026, 10, 12));
    }

    #[test]
    fn dish_roundtrip_drops_nameless_rows() {
        let (db, user) = setup();
        let dish = Dish::new(
            " Pâtes ",
            vec![
                Ingredient::new("Pâtes", 500.0, "g"),
                Ingredient::new("  ", 1.0, "g"),
            ],
        );
        let id = db.create_dish(&user, &dish).unwrap();
        let stored = db.get_dish(&user, &id).unwrap().unwrap();

        assert_eq!(stored.name, "Pâtes");
        assert_eq!(stored.ingredients, vec![Ingredient::new("Pâtes", 500.0, "g")]);
    }

    #[test]
    fn nameless_dish_is_rejected() {
        let (db, user) = setup();
        let err = db.create_dish(&user, &Dish::new(" ", vec![])).unwrap_err();
        assert!(matches!(err, PlannerError::MalformedInput(_)));
    }

    #[test]
    fn dishes_are_private_per_user() {
        let (db, alice) = setup();
        let bob = UserContext::new("bob").unwrap();
        let id = db.create_dish(&alice, &Dish::new("Soupe", vec![])).unwrap();

        assert!(db.get_dish(&bob, &id).unwrap().is_none());
        assert!(db.list_dishes(&bob).unwrap().is_empty());
    }

    #[test]
    fn dishes_by_ids_keeps_order_and_repeats_and_skips_missing() {
        let (db, user) = setup();
        let a = db.create_dish(&user, &Dish::new("A", vec![])).unwrap();
        let b = db.create_dish(&user, &Dish::new("B", vec![])).unwrap();

        let ids = vec![b.clone(), "gone".to_string(), a.clone(), b.clone()];
        let names: Vec<String> = db
            .dishes_by_ids(&user, &ids)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["B", "A", "B"]);
    }

    #[test]
    fn stock_requires_all_fields() {
        let (db, user) = setup();
        let err = db.add_stock_item(&user, "riz", "", "kg", None).unwrap_err();
        assert!(matches!(err, PlannerError::MalformedInput(_)));
    }

    #[test]
    fn stock_keeps_quantity_text_and_parses_it() {
        let (db, user) = setup();
        let item = db.add_stock_item(&user, "Riz", "0.5 kg", "kg", None).unwrap();
        assert_eq!(item.quantity, 0.5);

        let listed = db.current_stock(&user).unwrap();
        assert_eq!(listed, vec![item]);
    }

    #[test]
    fn expiring_items_sorted_by_date() {
        let (db, user) = setup();
        let today = date(2026, 10, 18);
        db.add_stock_item(&user, "Lait", "1", "L", Some(date(2026, 10, 20)))
            .unwrap();
        db.add_stock_item(&user, "Yaourt", "4", "pots", Some(date(2026, 10, 17)))
            .unwrap();
        db.add_stock_item(&user, "Riz", "1", "kg", Some(date(2027, 1, 1)))
            .unwrap();
        db.add_stock_item(&user, "Sel", "1", "kg", None).unwrap();

        let names: Vec<String> = db
            .expiring_stock(&user, today, 3)
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Yaourt", "Lait"]);
    }

    #[test]
    fn plan_assign_and_remove() {
        let (db, user) = setup();
        let day = date(2026, 10, 19);
        let soup = db.create_dish(&user, &Dish::new("Soupe", vec![])).unwrap();

        assert!(db.plan_for_day(&user, day).unwrap().is_none());
        db.assign_dish(&user, day, &soup).unwrap();
        let planned = db.assign_dish(&user, day, &soup).unwrap();
        assert_eq!(planned.dish_ids, vec![soup.clone(), soup.clone()]);
        assert_eq!(db.dish_ids_for(&user, day).unwrap().len(), 2);

        let cleared = db.remove_dish(&user, day, &soup).unwrap();
        assert!(cleared.dish_ids.is_empty());
        // the day document still exists, just empty
        assert!(db.plan_for_day(&user, day).unwrap().is_some());
    }

    #[test]
    fn concurrent_first_assignments_are_both_kept() {
        let (db, user) = setup();
        let soup = db.create_dish(&user, &Dish::new("Soupe", vec![])).unwrap();
        let salad = db.create_dish(&user, &Dish::new("Salade", vec![])).unwrap();

        for d in 1..=28 {
            let day = date(2026, 2, d);
            let barrier = std::sync::Barrier::new(2);
            std::thread::scope(|s| {
                for dish in [&soup, &salad] {
                    let (db, user, barrier) = (&db, &user, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        db.assign_dish(user, day, dish).unwrap();
                    });
                }
            });
            assert_eq!(db.dish_ids_for(&user, day).unwrap().len(), 2, "{}", day);
        }
    }

    #[test]
    fn assigning_unknown_dish_is_not_found() {
        let (db, user) = setup();
        let err = db.assign_dish(&user, date(2026, 10, 19), "nope").unwrap_err();
        assert!(matches!(err, PlannerError::NotFound { .. }));
    }

    #[test]
    fn week_plan_fills_gaps() {
        let (db, user) = setup();
        let soup = db.create_dish(&user, &Dish::new("Soupe", vec![])).unwrap();
        db.assign_dish(&user, date(2026, 10, 14), &soup).unwrap();

        let week = db.week_plan(&user, date(2026, 10, 18)).unwrap();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, date(2026, 10, 12));
        assert_eq!(week[2].dish_ids, vec![soup]);
        assert!(week[6].dish_ids.is_empty());
    }

    #[test]
    fn import_reads_raw_document() {
        let (db, user) = setup();
        let raw = serde_json::json!({
            "nom": "Riz cantonais",
            "ingredients": [{ "nom": "Riz", "quantite": "2", "unite": "kg" }, { "nom": "" }]
        });
        let id = db.import_dish(&user, &raw).unwrap();
        let dish = db.get_dish(&user, &id).unwrap().unwrap();
        assert_eq!(dish.ingredients.len(), 1);
    }
}
