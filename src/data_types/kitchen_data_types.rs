use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::document::{
    as_object, date_field, date_key, opt_string_field, parse_date_key, quantity_field,
    required_string_field, string_field, string_list_field, Document, FromDocument, ToDocument,
};
use crate::errors::DocumentParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dish {
    pub id: String,
    pub name: String,
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockItem {
    pub id: String,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub expiry: Option<NaiveDate>,
}

/// Dishes planned for one calendar day. A missing day means "no plan".
#[derive(Debug, Clone, PartialEq)]
pub struct MealPlanDay {
    pub date: NaiveDate,
    pub dish_ids: Vec<String>,
}

// older clients wrote english keys
fn text_with_fallback(doc: &Document, key: &str, fallback: &str) -> String {
    let s = string_field(doc, key);
    if s.is_empty() {
        string_field(doc, fallback)
    } else {
        s
    }
}

impl Ingredient {
    pub fn new(name: impl Into<String>, quantity: f64, unit: impl Into<String>) -> Self {
        Ingredient {
            name: name.into(),
            quantity,
            unit: unit.into(),
        }
    }

    /// Rows that are not objects read as an empty, nameless ingredient.
    fn from_value(value: &Value) -> Self {
        match value.as_object() {
            Some(doc) => Ingredient {
                name: text_with_fallback(doc, "nom", "name").trim().to_string(),
                quantity: if doc.contains_key("quantite") {
                    quantity_field(doc, "quantite")
                } else {
                    quantity_field(doc, "quantity")
                },
                unit: text_with_fallback(doc, "unite", "unit").trim().to_string(),
            },
            None => Ingredient::new("", 0.0, ""),
        }
    }

    fn to_value(&self) -> Value {
        json!({
            "nom": self.name,
            "quantite": self.quantity.to_string(),
            "unite": self.unit,
        })
    }
}

impl Dish {
    pub fn new(name: impl Into<String>, ingredients: Vec<Ingredient>) -> Self {
        Dish {
            id: String::new(),
            name: name.into(),
            ingredients,
        }
    }
}

impl FromDocument for Dish {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError> {
        let obj = as_object(id, doc)?;
        let name = match opt_string_field(obj, "nom") {
            Some(name) => name,
            None => required_string_field(id, obj, "name")?,
        };
        let ingredients = match obj.get("ingredients") {
            Some(Value::Array(rows)) => rows.iter().map(Ingredient::from_value).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(DocumentParseError::InvalidField {
                    id: id.to_string(),
                    field: "ingredients",
                })
            }
        };

        Ok(Dish {
            id: id.to_string(),
            name,
            ingredients,
        })
    }
}

impl ToDocument for Dish {
    fn to_document(&self) -> Value {
        json!({
            "nom": self.name,
            "ingredients": self.ingredients.iter().map(Ingredient::to_value).collect::<Vec<_>>(),
        })
    }
}

impl FromDocument for StockItem {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError> {
        let obj = as_object(id, doc)?;
        Ok(StockItem {
            id: id.to_string(),
            name: required_string_field(id, obj, "nom")?,
            quantity: quantity_field(obj, "quantite"),
            unit: string_field(obj, "unite").trim().to_string(),
            expiry: date_field(obj, "expiryDate"),
        })
    }
}

impl ToDocument for StockItem {
    fn to_document(&self) -> Value {
        let mut doc = json!({
            "nom": self.name,
            "quantite": self.quantity.to_string(),
            "unite": self.unit,
        });
        if let Some(expiry) = self.expiry {
            doc["expiryDate"] = Value::String(date_key(expiry));
        }
        doc
    }
}

impl MealPlanDay {
    pub fn empty(date: NaiveDate) -> Self {
        MealPlanDay {
            date,
            dish_ids: Vec::new(),
        }
    }
}

impl FromDocument for MealPlanDay {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError> {
        let obj = as_object(id, doc)?;
        let date = date_field(obj, "date")
            .or_else(|| parse_date_key(id))
            .ok_or_else(|| DocumentParseError::InvalidField {
                id: id.to_string(),
                field: "date",
            })?;

        Ok(MealPlanDay {
            date,
            dish_ids: string_list_field(obj, "dishIds"),
        })
    }
}

impl ToDocument for MealPlanDay {
    fn to_document(&self) -> Value {
        json!({
            "date": date_key(self.date),
            "dishIds": self.dish_ids,
        })
    }
}
