//! Static catalog of metered services.
//!
//! Prices are in credits; 1,000 credits equal one cent.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub const WHISPER_LARGE_V3: &str = "whisperLargeV3";
pub const SD35_LARGE: &str = "stability.sd35Large";
pub const SD3_MEDIUM: &str = "stability.sd3Medium";
pub const SDXL: &str = "stability.sdxl";
pub const ANIMAGINE_XL3: &str = "animagine.xl3";
pub const READ_WEBPAGE: &str = "readWebpage";
pub const DOCUMENT_TO_TEXT: &str = "documentToText";
pub const GOOGLE_SEARCH: &str = "googleSearch";
pub const TEXT_DETECTION: &str = "gcp.textDetection";
pub const TRANSLATE_TEXT: &str = "translateText";
pub const TEXT_TO_SPEECH: &str = "gcp.textToSpeech";

/// Default model for text-to-image when the script names none.
pub const DEFAULT_IMAGE_SERVICE: &str = SD3_MEDIUM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "model", content = "credits")]
pub enum PricingModel {
    PerRequest(u64),
    PerMinute(u64),
    PerCharacter(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub url: String,
    pub account_id: String,
    pub pricing: PricingModel,
}

impl ServiceDescriptor {
    fn new(url: &str, account_id: &str, pricing: PricingModel) -> Self {
        Self {
            url: url.to_string(),
            account_id: account_id.to_string(),
            pricing,
        }
    }
}

/// Immutable name → descriptor table. Built once at startup and shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    services: BTreeMap<String, ServiceDescriptor>,
}

static BUILTIN: Lazy<ServiceCatalog> = Lazy::new(|| {
    use PricingModel::*;

    ServiceCatalog::from_entries([
        (
            WHISPER_LARGE_V3,
            ServiceDescriptor::new(
                "https://pipe.openkbs.com/openai--whisper-large-v3--default",
                "a3d08121d9bd3b0723e3bdd2046d0368",
                PerMinute(600),
            ),
        ),
        (
            SD35_LARGE,
            ServiceDescriptor::new(
                "https://pipe.openkbs.com/stabilityai--stable-3.5-large--default",
                "262be27db3355db0b5164bc4f50fee5f",
                PerRequest(2000),
            ),
        ),
        (
            SD3_MEDIUM,
            ServiceDescriptor::new(
                "https://pipe.openkbs.com/stabilityai--stable-diffusion-3-medium-diffusers--default",
                "9dd958f4d240fdf65b2d7adfec7b1c88",
                PerRequest(1000),
            ),
        ),
        (
            SDXL,
            ServiceDescriptor::new(
                "https://pipe.openkbs.com/stabilityai--stable-diffusion-xl-base-1.0--with-refiner",
                "823a4455353a7338a2ddb4d196407e02",
                PerRequest(200),
            ),
        ),
        (
            ANIMAGINE_XL3,
            ServiceDescriptor::new(
                "https://pipe.openkbs.com/cagliostrolab--animagine-xl-3.0--default",
                "9326273541dade3a8ea71c628db2ba35",
                PerRequest(400),
            ),
        ),
        (
            READ_WEBPAGE,
            ServiceDescriptor::new(
                "https://webtools.openkbs.com/readWebpage",
                "c10975c3ac1b34cbbf6fda8ca315c1d3",
                PerMinute(8 * 60),
            ),
        ),
        (
            DOCUMENT_TO_TEXT,
            ServiceDescriptor::new(
                "https://doctools.openkbs.com",
                "0b9b011827d4a19b8d8e320f3a3f6337",
                PerMinute(4 * 60),
            ),
        ),
        (
            GOOGLE_SEARCH,
            ServiceDescriptor::new(
                "https://webtools.openkbs.com/googleSearch",
                "3903571e4243f078b7e80d0d34039ead",
                PerRequest(600),
            ),
        ),
        (
            TEXT_DETECTION,
            ServiceDescriptor::new(
                "https://api.openkbs.com/imageToText",
                "b28ee77d5a8dce90abdff4781e8fdadf",
                PerRequest(150),
            ),
        ),
        (
            TRANSLATE_TEXT,
            ServiceDescriptor::new(
                "https://api.openkbs.com/translateText",
                "cbda4c0737d6a3c2e7c7201dc75ff0b2",
                PerCharacter(3),
            ),
        ),
        (
            TEXT_TO_SPEECH,
            ServiceDescriptor::new(
                "https://api.openkbs.com/textToSpeech",
                "287434e0a2c405f9116ebc4e5b572cc3",
                PerCharacter(3),
            ),
        ),
    ])
});

impl ServiceCatalog {
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a str, ServiceDescriptor)>,
    ) -> Self {
        Self {
            services: entries
                .into_iter()
                .map(|(name, descriptor)| (name.to_string(), descriptor))
                .collect(),
        }
    }

    /// The catalog compiled into the gateway.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Load a catalog from a JSON object of `name → descriptor`.
    pub fn from_json_file(path: &Path) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("read {}: {e}", path.display())))?;
        let catalog: Self = serde_json::from_str(&raw)
            .map_err(|e| GatewayError::Config(format!("parse {}: {e}", path.display())))?;
        if catalog.services.is_empty() {
            return Err(GatewayError::Config(format!(
                "{} defines no services",
                path.display()
            )));
        }
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Result<&ServiceDescriptor, GatewayError> {
        self.services
            .get(name)
            .ok_or_else(|| GatewayError::ServiceLookupMiss(name.to_string()))
    }

    pub fn find_by_url(&self, url: &str) -> Result<&ServiceDescriptor, GatewayError> {
        self.services
            .values()
            .find(|s| s.url == url)
            .ok_or_else(|| GatewayError::ServiceLookupMiss(url.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
