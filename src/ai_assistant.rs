//! Cooking assistant backed by an Ollama-compatible `/generate` endpoint.

use regex_lite::{Captures, Regex};
use serde::Deserialize;
use serde_json::json;
use static_init::dynamic;
use std::{str::FromStr, time::Instant};
use thiserror::Error;

use crate::constants::{AI_FAILED_MSG, AI_UNCONFIGURED_MSG, MALFORMED_MSG, NO_INGREDIENTS_MSG};

const DEFAULT_CONSTRAINTS: &str = "équilibré, varié";
const DEFAULT_DISH: &str = "ratatouille traditionnelle";
const PLAN_DAYS: u32 = 7;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("assistant host or model not configured")]
    Unconfigured,
    #[error("assistant unavailable: {0}")]
    Unavailable(String),
    #[error("unreadable assistant response: {0}")]
    BadResponse(String),
    #[error("no ingredients to cook with")]
    NoIngredients,
    #[error("empty prompt")]
    EmptyPrompt,
    #[error("unknown assistant feature '{0}'")]
    UnknownFeature(String),
}

impl AiError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AiError::Unconfigured => AI_UNCONFIGURED_MSG,
            AiError::NoIngredients => NO_INGREDIENTS_MSG,
            AiError::Unavailable(_) | AiError::BadResponse(_) => AI_FAILED_MSG,
            AiError::EmptyPrompt | AiError::UnknownFeature(_) => MALFORMED_MSG,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AiFeature {
    SmartRecipe,
    MealPlanning,
    CookingGuide,
    Chat,
}

impl AiFeature {
    pub fn id(&self) -> &'static str {
        match self {
            AiFeature::SmartRecipe => "smart-recipe",
            AiFeature::MealPlanning => "meal-planning",
            AiFeature::CookingGuide => "cooking-guide",
            AiFeature::Chat => "chat",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AiFeature::SmartRecipe => "Recettes Intelligentes",
            AiFeature::MealPlanning => "Planification de Repas",
            AiFeature::CookingGuide => "Guide de Cuisine",
            AiFeature::Chat => "Discussion",
        }
    }

    fn template(&self) -> Option<&'static str> {
        match self {
            AiFeature::SmartRecipe => Some(
                "Je veux cuisiner avec les ingrédients suivants: {{ingredients}}. \
                 Suggère-moi une recette délicieuse, facile à préparer avec des instructions détaillées. \
                 Inclure le temps de préparation, le temps de cuisson et les valeurs nutritionnelles approximatives. \
                 Répondre en français.",
            ),
            AiFeature::MealPlanning => Some(
                "Crée-moi un plan de repas équilibré pour {{days}} jours avec les contraintes suivantes: {{constraints}}. \
                 Pour chaque jour, suggère un petit-déjeuner, déjeuner et dîner. \
                 Inclure une liste d'achats organisée par catégorie. Répondre en français.",
            ),
            AiFeature::CookingGuide => Some(
                "Je veux cuisiner {{dish}}. Donne-moi un guide étape par étape détaillé. \
                 Inclure des conseils de chef pour chaque étape critique, des alternatives pour les ingrédients \
                 difficiles à trouver, et comment savoir quand le plat est parfaitement cuit. Répondre en français.",
            ),
            AiFeature::Chat => None,
        }
    }

    /// Fills the feature's template.
    ///
    /// `input` is the user's free text: extra ingredients, dietary constraints,
    /// the dish to cook or the chat message. `stock_names` is only read by
    /// [`AiFeature::SmartRecipe`].
    pub fn build_prompt(&self, input: Option<&str>, stock_names: &[String]) -> Result<String, AiError> {
        let input = input.map(str::trim).filter(|s| !s.is_empty());

        let values: Vec<(&str, String)> = match self {
            AiFeature::SmartRecipe => {
                let mut ingredients: Vec<&str> = stock_names
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect();
                ingredients.extend(input);
                if ingredients.is_empty() {
                    return Err(AiError::NoIngredients);
                }
                vec![("ingredients", ingredients.join(", "))]
            }
            AiFeature::MealPlanning => vec![
                ("constraints", input.unwrap_or(DEFAULT_CONSTRAINTS).to_string()),
                ("days", PLAN_DAYS.to_string()),
            ],
            AiFeature::CookingGuide => vec![("dish", input.unwrap_or(DEFAULT_DISH).to_string())],
            AiFeature::Chat => return input.map(str::to_string).ok_or(AiError::EmptyPrompt),
        };

        Ok(render(self.template().unwrap_or_default(), &values))
    }
}

impl FromStr for AiFeature {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "smart-recipe" => Ok(AiFeature::SmartRecipe),
            "meal-planning" => Ok(AiFeature::MealPlanning),
            "cooking-guide" => Ok(AiFeature::CookingGuide),
            "chat" => Ok(AiFeature::Chat),
            other => Err(AiError::UnknownFeature(other.to_string())),
        }
    }
}

/// Replaces `{{key}}` placeholders; unknown keys are left as they are.
fn render(template: &str, values: &[(&str, String)]) -> String {
    #[dynamic]
    static RE: Regex = Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap();

    RE.replace_all(template, |caps: &Captures| {
        values
            .iter()
            .find(|(key, _)| *key == &caps[1])
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

#[derive(Debug, Clone, Default)]
pub struct AiConfig {
    /// API base, e.g. `http://127.0.0.1:11434/api`
    pub host: Option<String>,
    pub model: Option<String>,
}

#[derive(Deserialize, Debug)]
struct LlamaResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

fn decode_response(txt: &str) -> Result<String, AiError> {
    let resp: LlamaResponse =
        serde_json::from_str(txt).map_err(|e| AiError::BadResponse(e.to_string()))?;
    if !resp.done {
        log::debug!("assistant reported an unfinished response");
    }
    if resp.response.trim().is_empty() {
        return Err(AiError::BadResponse("empty response".to_string()));
    }
    Ok(resp.response)
}

pub struct AiClient {
    config: AiConfig,
    client: reqwest::Client,
}

impl AiClient {
    pub fn new(config: AiConfig) -> Self {
        AiClient {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.host.is_some() && self.config.model.is_some()
    }

    /// One request, no retry.
    pub async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let (Some(host), Some(model)) = (&self.config.host, &self.config.model) else {
            log::warn!("Ollama API is unconfigured, cannot ask the assistant");
            return Err(AiError::Unconfigured);
        };

        let params = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });

        log::info!("AI Query: '{}'", prompt);
        let now = Instant::now();

        let res = self
            .client
            .post(format!("{}/generate", host.trim_end_matches('/')))
            .json(&params)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| {
                log::warn!("Ollama API unavailable: {}", e);
                AiError::Unavailable(e.to_string())
            })?;
        let txt = res
            .text()
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))?;

        let answer = decode_response(&txt)?;
        log::debug!("AI response after {:.2?}", now.elapsed());
        Ok(answer)
    }

    pub async fn ask(
        &self,
        feature: AiFeature,
        input: Option<&str>,
        stock_names: &[String],
    ) -> Result<String, AiError> {
        let prompt = feature.build_prompt(input, stock_names)?;
        self.generate(&prompt).await
    }
}
