use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::common::Product;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::search::engine::SearchEngine;

const GCS_PREFIX: &str = "gs://";
const GCS_PUBLIC_PREFIX: &str = "https://storage.googleapis.com/";

#[derive(Debug, Serialize)]
pub struct AnnotateRequest {
    pub requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub image: ImageContent,
    pub features: Vec<Feature>,
    pub image_context: ImageContext,
}

#[derive(Debug, Serialize)]
pub struct ImageContent {
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub max_results: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContext {
    pub product_search_params: ProductSearchParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSearchParams {
    pub product_set: String,
    pub product_categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnnotateResponse {
    #[serde(default)]
    pub responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub product_search_results: Option<ProductSearchResults>,
}

#[derive(Debug, Deserialize)]
pub struct ProductSearchResults {
    #[serde(default)]
    pub results: Vec<ProductResult>,
}

#[derive(Debug, Deserialize)]
pub struct ProductResult {
    pub product: ProductInfo,
    /// Resource name of the matching reference image.
    pub image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    pub display_name: String,
    #[serde(default)]
    pub product_category: String,
}

#[derive(Debug, Deserialize)]
pub struct ReferenceImage {
    pub uri: String,
}

/// Client of the product search backend: one annotate call per object, then one lookup per
/// matched reference image to get a displayable URL.
pub struct ProductSearchClient {
    client: Client,
    config: SearchConfig,
}

impl ProductSearchClient {
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { client, config })
    }

    pub fn product_set(&self) -> String {
        format!(
            "projects/{}/locations/{}/productSets/{}",
            self.config.project_id, self.config.location_id, self.config.product_set_id
        )
    }

    pub fn build_request(&self, image_jpeg: &[u8]) -> AnnotateRequest {
        AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: BASE64.encode(image_jpeg),
                },
                features: vec![Feature {
                    kind: "PRODUCT_SEARCH".to_string(),
                    max_results: self.config.max_results,
                }],
                image_context: ImageContext {
                    product_search_params: ProductSearchParams {
                        product_set: self.product_set(),
                        product_categories: self.config.product_categories.clone(),
                    },
                },
            }],
        }
    }

    async fn annotate(&self, image_jpeg: &[u8]) -> Result<Vec<ProductResult>, SearchError> {
        let url = format!(
            "{}/images:annotate?key={}",
            self.config.endpoint, self.config.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&self.build_request(image_jpeg))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }
        let body: AnnotateResponse = response.json().await?;
        parse_results(body)
    }

    async fn resolve_image(&self, result: ProductResult) -> Result<Product, SearchError> {
        let url = format!(
            "{}/{}?key={}",
            self.config.endpoint, result.image, self.config.api_key
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }
        let image: ReferenceImage = response.json().await?;
        Ok(Product::new(
            public_image_url(&image.uri),
            result.product.display_name,
            result.product.product_category,
        ))
    }
}

#[async_trait]
impl SearchEngine for ProductSearchClient {
    async fn search(&self, image_jpeg: Bytes) -> Result<Vec<Product>, SearchError> {
        let results = self.annotate(&image_jpeg).await?;
        tracing::debug!("Product search matched {} reference images", results.len());

        let lookups = results.into_iter().map(|result| self.resolve_image(result));
        let products = join_all(lookups)
            .await
            .into_iter()
            .filter_map(|product| match product {
                Ok(product) => Some(product),
                Err(e) => {
                    tracing::warn!("Dropping product whose image lookup failed: {}", e);
                    None
                }
            })
            .collect();
        Ok(products)
    }
}

fn parse_results(body: AnnotateResponse) -> Result<Vec<ProductResult>, SearchError> {
    let response = body
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| SearchError::MalformedResponse("no responses".to_string()))?;
    Ok(response
        .product_search_results
        .map(|results| results.results)
        .unwrap_or_default())
}

/// Cloud storage URIs are served publicly over HTTPS.
pub fn public_image_url(uri: &str) -> String {
    match uri.strip_prefix(GCS_PREFIX) {
        Some(path) => format!("{}{}", GCS_PUBLIC_PREFIX, path),
        None => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ProductSearchClient {
        ProductSearchClient::new(SearchConfig::default()).unwrap()
    }

    #[test]
    fn request_carries_image_and_product_set() {
        let request = client().build_request(&[1, 2, 3]);
        let json = serde_json::to_value(&request).unwrap();
        let first = &json["requests"][0];
        assert_eq!(first["image"]["content"], "AQID");
        assert_eq!(first["features"][0]["type"], "PRODUCT_SEARCH");
        assert_eq!(first["features"][0]["maxResults"], 4);
        assert_eq!(
            first["imageContext"]["productSearchParams"]["productSet"],
            "projects/odml-codelabs/locations/us-east1/productSets/product_set0"
        );
        assert_eq!(
            first["imageContext"]["productSearchParams"]["productCategories"][0],
            "apparel-v2"
        );
    }

    #[test]
    fn results_are_read_from_the_first_response() {
        let body: AnnotateResponse = serde_json::from_str(
            r#"{
                "responses": [{
                    "productSearchResults": {
                        "results": [{
                            "product": {"displayName": "Red dress", "productCategory": "apparel-v2"},
                            "image": "projects/p/locations/l/products/1/referenceImages/a"
                        }]
                    }
                }]
            }"#,
        )
        .unwrap();
        let results = parse_results(body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].product.display_name, "Red dress");
        assert!(results[0].image.ends_with("referenceImages/a"));
    }

    #[test]
    fn response_without_matches_is_empty() {
        let body: AnnotateResponse = serde_json::from_str(r#"{"responses": [{}]}"#).unwrap();
        assert!(parse_results(body).unwrap().is_empty());

        let body: AnnotateResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(
            parse_results(body),
            Err(SearchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn storage_uris_become_public_urls() {
        assert_eq!(
            public_image_url("gs://bucket/shirt.jpg"),
            "https://storage.googleapis.com/bucket/shirt.jpg"
        );
        assert_eq!(
            public_image_url("https://example.com/a.jpg"),
            "https://example.com/a.jpg"
        );
    }
}
