//! Nutrition lookup against USDA FoodData Central

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{read_json, RetryPolicy, UpstreamError};
use crate::models::Nutrition;

const SERVICE: &str = "fooddata-central";

#[async_trait]
pub trait NutritionLookup: Send + Sync {
    /// Per-100 g nutrition of the best match for `name`
    async fn lookup(&self, name: &str) -> Result<Nutrition, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<SearchFood>,
}

#[derive(Debug, Deserialize)]
struct SearchFood {
    #[serde(rename = "foodNutrients", default)]
    food_nutrients: Vec<FoodNutrient>,
}

#[derive(Debug, Deserialize)]
struct FoodNutrient {
    #[serde(rename = "nutrientName", default)]
    nutrient_name: String,
    #[serde(rename = "unitName", default)]
    unit_name: String,
    #[serde(default)]
    value: f64,
}

/// Pull the tracked nutrients out of one search hit
fn extract_nutrition(nutrients: &[FoodNutrient]) -> Nutrition {
    let mut nutrition = Nutrition::zero();
    for n in nutrients {
        match n.nutrient_name.as_str() {
            // Energy is also reported in kJ
            "Energy" if n.unit_name.eq_ignore_ascii_case("KCAL") => nutrition.calories = n.value,
            "Protein" => nutrition.protein = n.value,
            "Total lipid (fat)" => nutrition.fat = n.value,
            "Carbohydrate, by difference" => nutrition.carbs = n.value,
            "Total Sugars" => nutrition.sugar = n.value,
            _ => {}
        }
    }
    nutrition
}

#[derive(Debug, Clone)]
pub struct FoodDataCentralClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl FoodDataCentralClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry,
        })
    }
}

#[async_trait]
impl NutritionLookup for FoodDataCentralClient {
    async fn lookup(&self, name: &str) -> Result<Nutrition, UpstreamError> {
        let url = format!("{}/foods/search", self.base_url);
        debug!("FDC search for '{}'", name);

        let resp: SearchResponse = self
            .retry
            .run(SERVICE, || {
                let request = self
                    .client
                    .get(&url)
                    .query(&[("api_key", self.api_key.as_str()), ("query", name)]);
                async move {
                    let resp = request
                        .send()
                        .await
                        .map_err(|e| UpstreamError::transport(SERVICE, e))?;
                    read_json(SERVICE, resp).await
                }
            })
            .await?;

        resp.foods
            .first()
            .map(|food| extract_nutrition(&food.food_nutrients))
            .ok_or_else(|| UpstreamError::NoResult {
                service: SERVICE,
                query: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_nutrition_from_search_hit() {
        let resp: SearchResponse = serde_json::from_str(
            r#"{"foods":[{"description":"Apple","foodNutrients":[
                {"nutrientName":"Energy","unitName":"kJ","value":218.0},
                {"nutrientName":"Energy","unitName":"KCAL","value":52.0},
                {"nutrientName":"Protein","unitName":"G","value":0.26},
                {"nutrientName":"Total lipid (fat)","unitName":"G","value":0.17},
                {"nutrientName":"Carbohydrate, by difference","unitName":"G","value":13.8},
                {"nutrientName":"Total Sugars","unitName":"G","value":10.4},
                {"nutrientName":"Fiber, total dietary","unitName":"G","value":2.4}
            ]}]}"#,
        )
        .unwrap();

        let n = extract_nutrition(&resp.foods[0].food_nutrients);
        assert_eq!(n.calories, 52.0);
        assert_eq!(n.protein, 0.26);
        assert_eq!(n.fat, 0.17);
        assert_eq!(n.carbs, 13.8);
        assert_eq!(n.sugar, 10.4);
    }

    #[test]
    fn test_missing_nutrients_stay_zero() {
        let resp: SearchResponse = serde_json::from_str(r#"{"foods":[{"foodNutrients":[]}]}"#).unwrap();
        assert_eq!(extract_nutrition(&resp.foods[0].food_nutrients), Nutrition::zero());

        let empty: SearchResponse = serde_json::from_str(r#"{"totalHits":0}"#).unwrap();
        assert!(empty.foods.is_empty());
    }
}
