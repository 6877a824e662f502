use chrono::Utc;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use crate::{
    constants::SHOPPING_LISTS,
    data_backend::ShoppingListStore,
    data_types::{ShoppingList, ShoppingListItem, UserContext},
    db_operations::{release_list_channel, Database, ListChannels},
    document::{FromDocument, ToDocument},
    errors::PlannerError,
};

/// Live view of one shopping list.
///
/// Yields the snapshot current at subscription time first, then every
/// snapshot written afterwards by any member. Ends when the list is deleted.
/// Dropping it (or calling [`ListSubscription::unsubscribe`]) detaches it.
pub struct ListSubscription {
    list_id: String,
    pending: Option<ShoppingList>,
    rx: broadcast::Receiver<ShoppingList>,
    channels: ListChannels,
}

impl ListSubscription {
    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub async fn next(&mut self) -> Option<ShoppingList> {
        if let Some(snapshot) = self.pending.take() {
            return Some(snapshot);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("viewer of {} skipped {} snapshots", self.list_id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`ListSubscription::next`].
    pub fn try_next(&mut self) -> Option<ShoppingList> {
        if let Some(snapshot) = self.pending.take() {
            return Some(snapshot);
        }
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => return Some(snapshot),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        log::debug!("unsubscribed from {}", self.list_id);
    }
}

impl Drop for ListSubscription {
    fn drop(&mut self) {
        // our own receiver is still alive here
        release_list_channel(&self.channels, &self.list_id, 1);
    }
}

fn permission(user: &UserContext, action: &'static str) -> PlannerError {
    PlannerError::PermissionDenied {
        user: user.user_id().to_string(),
        action,
    }
}

impl Database {
    fn load_list(&self, list_id: &str) -> Result<Option<ShoppingList>, PlannerError> {
        self.get_document(SHOPPING_LISTS, list_id)?
            .map(|doc| ShoppingList::from_document(&doc.id, &doc.data).map_err(PlannerError::from))
            .transpose()
    }

    /// Read-modify-write of a list as one unit, then fan-out of the result.
    fn modify_list<T, F>(&self, list_id: &str, f: F) -> Result<(ShoppingList, T), PlannerError>
    where
        F: FnOnce(&mut ShoppingList) -> Result<T, PlannerError>,
    {
        // published before the connection lock is released: viewers get snapshots in commit order
        self.write_document(
            SHOPPING_LISTS,
            list_id,
            None,
            |doc| {
                let mut list = ShoppingList::from_document(list_id, doc)?;
                let out = f(&mut list)?;
                list.last_modified = Utc::now();
                *doc = list.to_document();
                Ok((list, out))
            },
            |(list, _): &(ShoppingList, T)| self.publish_list(list),
        )?
        .ok_or_else(|| PlannerError::not_found("shopping list", list_id))
    }

    fn modify_items<T, F>(
        &self,
        user: &UserContext,
        list_id: &str,
        f: F,
    ) -> Result<(ShoppingList, T), PlannerError>
    where
        F: FnOnce(&mut Vec<ShoppingListItem>) -> Result<T, PlannerError>,
    {
        self.modify_list(list_id, |list| {
            if !list.is_member(user.user_id()) {
                return Err(permission(user, "edit this list"));
            }
            let out = f(&mut list.items)?;
            list.items.iter_mut().for_each(ShoppingListItem::ensure_token);
            Ok(out)
        })
    }

    /// Lists the user owns or that were shared with them, most recently modified first.
    pub fn lists_for_user(&self, user: &UserContext) -> Result<Vec<ShoppingList>, PlannerError> {
        let mut docs = self.query_field_equals(SHOPPING_LISTS, "ownerId", user.user_id())?;
        docs.extend(self.query_array_contains(SHOPPING_LISTS, "sharedWith", user.user_id())?);

        let mut lists: Vec<ShoppingList> = Vec::with_capacity(docs.len());
        for doc in docs {
            if lists.iter().any(|l| l.id == doc.id) {
                continue;
            }
            match ShoppingList::from_document(&doc.id, &doc.data) {
                Ok(list) => lists.push(list),
                Err(e) => log::warn!("skipping shopping list {}: {}", doc.id, e),
            }
        }
        lists.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(lists)
    }

    pub fn add_item(
        &self,
        user: &UserContext,
        list_id: &str,
        item: ShoppingListItem,
    ) -> Result<ShoppingList, PlannerError> {
        if item.name.trim().is_empty() || item.unit.trim().is_empty() {
            return Err(PlannerError::MalformedInput(
                "items need a name and a unit".to_string(),
            ));
        }
        if !(item.quantity.is_finite() && item.quantity > 0.0) {
            return Err(PlannerError::MalformedInput(format!(
                "quantity {} of '{}'",
                item.quantity, item.name
            )));
        }
        let (list, ()) = self.modify_items(user, list_id, |items| {
            items.push(item);
            Ok(())
        })?;
        Ok(list)
    }

    /// Flips the checked state of one item and returns the new state.
    pub fn toggle_item(
        &self,
        user: &UserContext,
        list_id: &str,
        token: &str,
    ) -> Result<bool, PlannerError> {
        let (_, checked) = self.modify_items(user, list_id, |items| {
            let item = items
                .iter_mut()
                .find(|i| i.token.as_deref() == Some(token))
                .ok_or_else(|| PlannerError::not_found("list item", token))?;
            item.checked = !item.checked;
            Ok(item.checked)
        })?;
        Ok(checked)
    }

    pub fn remove_item(
        &self,
        user: &UserContext,
        list_id: &str,
        token: &str,
    ) -> Result<ShoppingList, PlannerError> {
        let (list, ()) = self.modify_items(user, list_id, |items| {
            let before = items.len();
            items.retain(|i| i.token.as_deref() != Some(token));
            if items.len() == before {
                return Err(PlannerError::not_found("list item", token));
            }
            Ok(())
        })?;
        Ok(list)
    }

    /// Adds the user to the list's members. `false` if they already were one.
    pub fn join_list(&self, user: &UserContext, list_id: &str) -> Result<bool, PlannerError> {
        let list = self
            .load_list(list_id)?
            .ok_or_else(|| PlannerError::not_found("shopping list", list_id))?;
        if list.is_member(user.user_id()) {
            return Ok(false);
        }

        self.modify_list(list_id, |list| {
            if !list.is_member(user.user_id()) {
                list.shared_with.push(user.user_id().to_string());
            }
            Ok(())
        })?;
        log::info!("{} joined list {}", user.user_id(), list_id);
        Ok(true)
    }

    pub fn leave_list(&self, user: &UserContext, list_id: &str) -> Result<(), PlannerError> {
        self.modify_list(list_id, |list| {
            if list.is_owner(user.user_id()) {
                return Err(permission(user, "leave a list they own"));
            }
            list.shared_with.retain(|u| u != user.user_id());
            Ok(())
        })?;
        log::info!("{} left list {}", user.user_id(), list_id);
        Ok(())
    }
}

impl ShoppingListStore for Database {
    fn create_list(
        &self,
        user: &UserContext,
        name: &str,
        mut items: Vec<ShoppingListItem>,
    ) -> Result<String, PlannerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlannerError::MalformedInput("list name is empty".to_string()));
        }
        items.iter_mut().for_each(ShoppingListItem::ensure_token);

        let now = Utc::now();
        let list = ShoppingList {
            id: String::new(),
            name: name.to_string(),
            owner_id: user.user_id().to_string(),
            shared_with: Vec::new(),
            created_at: now,
            last_modified: now,
            items,
        };
        let id = self.add_document(SHOPPING_LISTS, &list.to_document())?;
        log::info!(
            "{} created list '{}' ({}) with {} items",
            user.user_id(),
            name,
            id,
            list.items.len()
        );
        Ok(id)
    }

    fn get_list(
        &self,
        user: &UserContext,
        list_id: &str,
    ) -> Result<Option<ShoppingList>, PlannerError> {
        match self.load_list(list_id)? {
            Some(list) if !list.is_member(user.user_id()) => Err(permission(user, "read this list")),
            other => Ok(other),
        }
    }

    fn subscribe_list(
        &self,
        user: &UserContext,
        list_id: &str,
    ) -> Result<ListSubscription, PlannerError> {
        // membership first, so refused subscribes never touch the registry
        self.get_list(user, list_id)?
            .ok_or_else(|| PlannerError::not_found("shopping list", list_id))?;

        // register before reading the snapshot so no write can fall between the two
        let rx = self.list_receiver(list_id)?;
        let current = match self.get_list(user, list_id) {
            Ok(Some(list)) => list,
            other => {
                drop(rx);
                release_list_channel(&self.list_channels(), list_id, 0);
                return Err(match other {
                    Err(e) => e,
                    _ => PlannerError::not_found("shopping list", list_id),
                });
            }
        };

        Ok(ListSubscription {
            list_id: list_id.to_string(),
            pending: Some(current),
            rx,
            channels: self.list_channels(),
        })
    }

    fn update_items(
        &self,
        user: &UserContext,
        list_id: &str,
        items: Vec<ShoppingListItem>,
    ) -> Result<ShoppingList, PlannerError> {
        let (list, ()) = self.modify_items(user, list_id, |current| {
            *current = items;
            Ok(())
        })?;
        Ok(list)
    }

    fn delete_list(&self, user: &UserContext, list_id: &str) -> Result<(), PlannerError> {
        let list = self
            .load_list(list_id)?
            .ok_or_else(|| PlannerError::not_found("shopping list", list_id))?;
        if !list.is_owner(user.user_id()) {
            return Err(permission(user, "delete this list"));
        }

        self.delete_document(SHOPPING_LISTS, list_id)?;
        self.close_list_channel(list_id);
        log::info!("{} deleted list '{}' ({})", user.user_id(), list.name, list_id);
        Ok(())
    }
}
