use std::cell::Cell;

use chrono::NaiveDate;
use garde_manger_rs::data_backend::{DishCatalog, MealPlanSource, ShoppingListStore, StockLedger};
use garde_manger_rs::data_types::{
    Dish, Ingredient, MealPlanDay, ShoppingListItem, StockItem, UserContext,
};
use garde_manger_rs::db_operations::Database;
use garde_manger_rs::errors::{ErrorCategory, PlannerError};
use garde_manger_rs::shopping_list_generator::{generate_for_date, plan_purchases};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn setup() -> (Database, UserContext) {
    (
        Database::open_in_memory().unwrap(),
        UserContext::new("alice").unwrap(),
    )
}

fn plan(db: &Database, user: &UserContext, dish: Dish) -> String {
    let id = db.create_dish(user, &dish).unwrap();
    db.assign_dish(user, day(), &id).unwrap();
    id
}

#[test]
fn rice_scenario_end_to_end() {
    let (db, user) = setup();
    plan(
        &db,
        &user,
        Dish::new("Riz cantonais", vec![Ingredient::new("Riz", 2.0, "kg")]),
    );
    db.add_stock_item(&user, "riz", "0.5", "kg", None).unwrap();

    let generated = generate_for_date(&db, Some(&user), day(), None).unwrap();
    assert_eq!(generated.name, "Courses du 19/10/2026");
    assert_eq!(generated.items, vec![ShoppingListItem::new("Riz", 1.5, "kg")]);

    let stored = db.get_list(&user, &generated.list_id).unwrap().unwrap();
    assert_eq!(stored.owner_id, "alice");
    assert!(stored.shared_with.is_empty());
    assert_eq!(stored.items.len(), 1);
    assert!(stored.items[0].same_content(&generated.items[0]));
    assert!(stored.items[0].token.is_some());
}

#[test]
fn two_dishes_share_an_ingredient() {
    let (db, user) = setup();
    plan(
        &db,
        &user,
        Dish::new(
            "Crêpes",
            vec![Ingredient::new("Lait", 1.0, "L"), Ingredient::new("Oeufs", 3.0, "")],
        ),
    );
    plan(
        &db,
        &user,
        Dish::new("Flan", vec![Ingredient::new("lait", 0.5, "L")]),
    );
    db.add_stock_item(&user, "Oeufs", "6", "pièces", None).unwrap();

    let items = plan_purchases(&db, Some(&user), day()).unwrap();
    assert_eq!(items, vec![ShoppingListItem::new("Lait", 1.5, "L")]);
}

#[test]
fn persisted_list_reads_back_in_order() {
    let (db, user) = setup();
    plan(
        &db,
        &user,
        Dish::new(
            "Salade",
            vec![
                Ingredient::new("Tomate", 4.0, ""),
                Ingredient::new("Feta", 200.0, "g"),
                Ingredient::new("Olives", 50.0, "g"),
            ],
        ),
    );

    let generated = generate_for_date(&db, Some(&user), day(), Some("Salade du soir")).unwrap();
    let stored = db.get_list(&user, &generated.list_id).unwrap().unwrap();

    assert_eq!(stored.name, "Salade du soir");
    assert_eq!(stored.items.len(), generated.items.len());
    assert!(stored
        .items
        .iter()
        .zip(&generated.items)
        .all(|(a, b)| a.same_content(b) && !a.checked));
}

#[test]
fn no_plan_and_nothing_to_buy_differ() {
    let (db, user) = setup();
    let err = generate_for_date(&db, Some(&user), day(), None).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NoPlan);

    plan(
        &db,
        &user,
        Dish::new("Omelette", vec![Ingredient::new("Oeufs", 3.0, "")]),
    );
    db.add_stock_item(&user, "oeufs", "12", "pièces", None).unwrap();

    let err = generate_for_date(&db, Some(&user), day(), None).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NothingToPurchase);
    assert_ne!(
        PlannerError::NoPlan(String::new()).user_message(),
        err.user_message()
    );
    assert!(db.lists_for_user(&user).unwrap().is_empty());
}

#[test]
fn plan_of_deleted_dishes_is_no_plan() {
    let (db, user) = setup();
    let id = plan(
        &db,
        &user,
        Dish::new("Soupe", vec![Ingredient::new("Poireau", 2.0, "")]),
    );
    db.delete_dish(&user, &id).unwrap();

    let err = plan_purchases(&db, Some(&user), day()).unwrap_err();
    assert!(matches!(err, PlannerError::NoPlan(ref d) if d == "2026-10-19"));
}

#[test]
fn users_do_not_see_each_other() {
    let (db, alice) = setup();
    let bob = UserContext::new("bob").unwrap();
    plan(
        &db,
        &alice,
        Dish::new("Pâtes", vec![Ingredient::new("Pâtes", 500.0, "g")]),
    );
    db.add_stock_item(&bob, "Pâtes", "1000", "g", None).unwrap();

    let items = plan_purchases(&db, Some(&alice), day()).unwrap();
    assert_eq!(items[0].quantity, 500.0);
    assert_eq!(
        plan_purchases(&db, Some(&bob), day()).unwrap_err().category(),
        ErrorCategory::NoPlan
    );
}

/// Counts reads so tests can tell whether the store was touched.
#[derive(Default)]
struct FakeStore {
    reads: Cell<usize>,
    stock_down: bool,
}

impl MealPlanSource for FakeStore {
    fn plan_for_day(
        &self,
        _user: &UserContext,
        date: NaiveDate,
    ) -> Result<Option<MealPlanDay>, PlannerError> {
        self.reads.set(self.reads.get() + 1);
        Ok(Some(MealPlanDay {
            date,
            dish_ids: vec!["d1".to_string()],
        }))
    }
}

impl DishCatalog for FakeStore {
    fn dishes_by_ids(&self, _user: &UserContext, _ids: &[String]) -> Result<Vec<Dish>, PlannerError> {
        self.reads.set(self.reads.get() + 1);
        Ok(vec![Dish::new("Riz", vec![Ingredient::new("Riz", 1.0, "kg")])])
    }
}

impl StockLedger for FakeStore {
    fn current_stock(&self, _user: &UserContext) -> Result<Vec<StockItem>, PlannerError> {
        self.reads.set(self.reads.get() + 1);
        if self.stock_down {
            return Err(PlannerError::Unavailable("stock timed out".to_string()));
        }
        Ok(Vec::new())
    }
}

#[test]
fn missing_user_fails_before_any_read() {
    let store = FakeStore::default();
    let err = plan_purchases(&store, None, day()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotAuthenticated);
    assert_eq!(store.reads.get(), 0);
}

#[test]
fn collaborator_failure_propagates_unchanged() {
    let store = FakeStore {
        stock_down: true,
        ..Default::default()
    };
    let err = plan_purchases(&store, Some(&UserContext::new("alice").unwrap()), day()).unwrap_err();
    assert!(matches!(err, PlannerError::Unavailable(_)));
    assert_eq!(store.reads.get(), 3);
}

#[tokio::test]
async fn shared_viewer_sees_edits() {
    let (db, alice) = setup();
    let bob = UserContext::new("bob").unwrap();
    plan(
        &db,
        &alice,
        Dish::new("Riz", vec![Ingredient::new("Riz", 1.0, "kg")]),
    );
    let generated = generate_for_date(&db, Some(&alice), day(), None).unwrap();

    assert!(db.join_list(&bob, &generated.list_id).unwrap());
    let mut sub = db.subscribe_list(&bob, &generated.list_id).unwrap();
    let first = sub.next().await.unwrap();
    assert_eq!(first.items.len(), 1);

    let token = first.items[0].token.clone().unwrap();
    assert!(db.toggle_item(&alice, &generated.list_id, &token).unwrap());

    let second = sub.next().await.unwrap();
    assert!(second.items[0].checked);
    assert!(second.last_modified >= first.last_modified);
}
