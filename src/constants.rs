pub const DEFAULT_DB: &str = "garde-manger.sqlite";

// top-level collections
pub const SHOPPING_LISTS: &str = "shoppingLists";

// per-user subcollections, addressed as users/{uid}/<name>
pub const DISHES: &str = "plats";
pub const STOCK: &str = "stock";
pub const MEAL_PLANS: &str = "mealPlans";
pub const HOUSEHOLD: &str = "foyer_membres";
pub const BUDGET_ENTRIES: &str = "budgetEntries";
pub const MEAL_HISTORY: &str = "repasHistorique";
pub const SAVED_RECIPES: &str = "savedRecipes";
pub const SAVED_MEAL_PLANS: &str = "mealPlans_ai";

pub const BUDGET_CATEGORIES: [&str; 5] = ["Épicerie", "Restaurant", "Boissons", "Livraison", "Autres"];
pub const FALLBACK_BUDGET_CATEGORY: &str = "Autres";

/// Capacity of every shopping list fan-out channel. Slow viewers skip to the newest snapshot.
pub const LIST_CHANNEL_CAPACITY: usize = 16;

pub const NO_USER_MSG: &str = "Utilisateur non connecté.";
pub const NO_PLAN_MSG: &str = "Aucun plat n'est prévu pour cette date.";
pub const NOTHING_TO_BUY_MSG: &str = "Votre stock couvre déjà tous les ingrédients prévus.";
pub const NOT_FOUND_MSG: &str = "Élément introuvable.";
pub const PERMISSION_MSG: &str = "Permission refusée.";
pub const UNAVAILABLE_MSG: &str = "Service momentanément indisponible. Veuillez réessayer.";
pub const MALFORMED_MSG: &str = "Données invalides.";

pub const AI_UNCONFIGURED_MSG: &str = "L'assistant n'est pas configuré (OLLAMA_HOST / OLLAMA_MODEL).";
pub const AI_FAILED_MSG: &str = "Impossible de générer une réponse. Veuillez réessayer.";
pub const NO_INGREDIENTS_MSG: &str = "Aucun ingrédient disponible. Veuillez saisir au moins un ingrédient.";
