use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};

use crate::document::{
    as_object, bool_field, opt_string_field, quantity_field, required_string_field, string_field,
    string_list_field, timestamp_field, FromDocument, ToDocument,
};
use crate::errors::DocumentParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingListItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub checked: bool,
    pub image_url: Option<String>,
    /// Random diffing token, assigned when the item is first persisted.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingList {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub shared_with: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub items: Vec<ShoppingListItem>,
}

pub fn new_item_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

impl ShoppingListItem {
    pub fn new(name: impl Into<String>, quantity: f64, unit: impl Into<String>) -> Self {
        ShoppingListItem {
            name: name.into(),
            quantity,
            unit: unit.into(),
            checked: false,
            image_url: None,
            token: None,
        }
    }

    /// Equal apart from the diffing token.
    pub fn same_content(&self, other: &ShoppingListItem) -> bool {
        self.name == other.name
            && self.quantity == other.quantity
            && self.unit == other.unit
            && self.checked == other.checked
            && self.image_url == other.image_url
    }

    pub fn ensure_token(&mut self) {
        if self.token.is_none() {
            self.token = Some(new_item_token());
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let doc = value.as_object()?;
        let name = opt_string_field(doc, "name")?;
        Some(ShoppingListItem {
            name,
            quantity: quantity_field(doc, "quantity"),
            unit: string_field(doc, "unit").trim().to_string(),
            // the detail screen of older clients wrote isCompleted
            checked: bool_field(doc, "checked") || bool_field(doc, "isCompleted"),
            image_url: opt_string_field(doc, "imageUrl"),
            token: opt_string_field(doc, "token"),
        })
    }

    fn to_value(&self) -> Value {
        let mut value = json!({
            "name": self.name,
            "quantity": self.quantity,
            "unit": self.unit,
            "checked": self.checked,
        });
        if let Some(url) = &self.image_url {
            value["imageUrl"] = Value::String(url.clone());
        }
        if let Some(token) = &self.token {
            value["token"] = Value::String(token.clone());
        }
        value
    }
}

impl ShoppingList {
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.shared_with.iter().any(|u| u == user_id)
    }

    pub fn remaining(&self) -> usize {
        self.items.iter().filter(|item| !item.checked).count()
    }

    /// Invitation text carrying the id another user needs to join.
    pub fn share_message(&self) -> String {
        format!(
            "Rejoignez ma liste de courses \"{}\" dans l'application ! Utilisez cet ID: \n\n{}\n\n",
            self.name, self.id
        )
    }
}

impl FromDocument for ShoppingList {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError> {
        let obj = as_object(id, doc)?;
        let created_at = timestamp_field(obj, "createdAt").ok_or_else(|| {
            DocumentParseError::MissingField {
                id: id.to_string(),
                field: "createdAt",
            }
        })?;
        let items = match obj.get("items") {
            Some(Value::Array(rows)) => rows.iter().filter_map(ShoppingListItem::from_value).collect(),
            _ => Vec::new(),
        };

        Ok(ShoppingList {
            id: id.to_string(),
            name: required_string_field(id, obj, "name")?,
            owner_id: required_string_field(id, obj, "ownerId")?,
            shared_with: string_list_field(obj, "sharedWith"),
            created_at,
            last_modified: timestamp_field(obj, "lastModified").unwrap_or(created_at),
            items,
        })
    }
}

impl ToDocument for ShoppingList {
    fn to_document(&self) -> Value {
        json!({
            "name": self.name,
            "ownerId": self.owner_id,
            "sharedWith": self.shared_with,
            "createdAt": self.created_at.to_rfc3339(),
            "lastModified": self.last_modified.to_rfc3339(),
            "items": self.items.iter().map(ShoppingListItem::to_value).collect::<Vec<_>>(),
        })
    }
}
