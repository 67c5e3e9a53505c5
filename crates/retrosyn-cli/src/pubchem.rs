//! PubChem PUG REST lookup for the availability oracle.
//!
//! Two requests are used:
//! - `compound/name/{name}/property/CanonicalSMILES/JSON` resolves a name,
//! - `compound/{smiles|name}/{query}/cids/JSON` checks for a record.
//!
//! A 404 means "no such compound". Rate limiting, server errors and network
//! timeouts are transient and may be retried by the oracle.

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use retrosyn_core::{LookupError, QueryKind, SubstanceLookup};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("retrosyn/", env!("CARGO_PKG_VERSION"));

pub struct PubChemClient {
    client: Client,
    base: Url,
}

impl PubChemClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| anyhow!("invalid PubChem URL `{base_url}`: {e}"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("invalid PubChem URL `{base_url}`: not a base URL"));
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to build http client: {e}"))?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn name_url(&self, name: &str) -> Url {
        self.endpoint(&["compound", "name", name, "property", "CanonicalSMILES", "JSON"])
    }

    fn cids_url(&self, query: &str, kind: QueryKind) -> Url {
        let namespace = match kind {
            QueryKind::Smiles => "smiles",
            QueryKind::Name => "name",
        };
        self.endpoint(&["compound", namespace, query, "cids", "JSON"])
    }

    /// `Ok(None)` on 404.
    fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<Option<T>, LookupError> {
        tracing::debug!(%url, "PubChem request");
        let resp = self.client.get(url.clone()).send().map_err(request_error)?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status));
        }
        resp.json::<T>()
            .map(Some)
            .map_err(|e| LookupError::Fatal(format!("bad PubChem response from {url}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct PropertyResponse {
    #[serde(rename = "PropertyTable")]
    table: PropertyTable,
}

#[derive(Debug, Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties", default)]
    properties: Vec<CompoundProperties>,
}

#[derive(Debug, Deserialize)]
struct CompoundProperties {
    // newer PubChem responses report the same field as ConnectivitySMILES
    #[serde(rename = "CanonicalSMILES", alias = "ConnectivitySMILES", default)]
    smiles: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CidsResponse {
    #[serde(rename = "IdentifierList")]
    list: IdentifierList,
}

#[derive(Debug, Deserialize)]
struct IdentifierList {
    #[serde(rename = "CID", default)]
    cids: Vec<u64>,
}

impl SubstanceLookup for PubChemClient {
    fn canonical_identifier(&self, name: &str) -> Result<Option<String>, LookupError> {
        let resp: Option<PropertyResponse> = self.get_json(self.name_url(name))?;
        Ok(resp.and_then(|r| r.table.properties.into_iter().find_map(|p| p.smiles)))
    }

    fn has_record(&self, query: &str, kind: QueryKind) -> Result<bool, LookupError> {
        let resp: Option<CidsResponse> = self.get_json(self.cids_url(query, kind))?;
        // PubChem answers unknown structures with CID 0
        Ok(resp.is_some_and(|r| r.list.cids.iter().any(|&cid| cid != 0)))
    }
}

fn status_error(status: StatusCode) -> LookupError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        LookupError::Transient(format!("PubChem returned {status}"))
    } else {
        LookupError::Fatal(format!("PubChem returned {status}"))
    }
}

fn request_error(err: reqwest::Error) -> LookupError {
    if err.is_timeout() || err.is_connect() {
        LookupError::Transient(err.to_string())
    } else {
        LookupError::Fatal(err.to_string())
    }
}
