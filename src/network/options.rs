//! Endpoint configuration accepted by `Network`
//!
//! Callers may pass a bare URL or a record whose `mina` and `archive` fields
//! are each a single URL or an ordered list. The options are resolved once,
//! when the network is constructed, into `ResolvedEndpoints`.

use serde::{Deserialize, Serialize};

use crate::rpc_manager::EndpointSet;
use crate::tx_builder::TransactionBuilderError;
use crate::types::NetworkId;

/// One URL or an ordered list (primary first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointList {
    One(String),
    Many(Vec<String>),
}

impl EndpointList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            EndpointList::One(url) => vec![url],
            EndpointList::Many(urls) => urls,
        }
    }
}

impl From<&str> for EndpointList {
    fn from(url: &str) -> Self {
        EndpointList::One(url.to_string())
    }
}

impl From<Vec<String>> for EndpointList {
    fn from(urls: Vec<String>) -> Self {
        EndpointList::Many(urls)
    }
}

/// How to reach a remote network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkOptions {
    /// Query endpoint only, testnet id, no archive
    Url(String),
    Detailed {
        mina: EndpointList,
        #[serde(default)]
        archive: Option<EndpointList>,
        #[serde(default, rename = "networkId", alias = "network_id")]
        network_id: Option<NetworkId>,
    },
}

impl From<&str> for NetworkOptions {
    fn from(url: &str) -> Self {
        NetworkOptions::Url(url.to_string())
    }
}

impl From<String> for NetworkOptions {
    fn from(url: String) -> Self {
        NetworkOptions::Url(url)
    }
}

/// Normalized endpoint record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    pub mina: EndpointSet,
    pub archive: Option<EndpointSet>,
    pub network_id: NetworkId,
}

impl NetworkOptions {
    pub fn resolve(self) -> Result<ResolvedEndpoints, TransactionBuilderError> {
        let resolved = match self {
            NetworkOptions::Url(url) => ResolvedEndpoints {
                mina: EndpointSet::new(url),
                archive: None,
                network_id: NetworkId::default(),
            },
            NetworkOptions::Detailed {
                mina,
                archive,
                network_id,
            } => {
                let mina = EndpointSet::from_list(mina.into_vec()).map_err(|_| {
                    TransactionBuilderError::Configuration(
                        "Network: malformed input. Please provide an object with 'mina' endpoint."
                            .to_string(),
                    )
                })?;
                // An empty archive list means no archive, not an error
                let archive = archive.and_then(|list| EndpointSet::from_list(list.into_vec()).ok());
                ResolvedEndpoints {
                    mina,
                    archive,
                    network_id: network_id.unwrap_or_default(),
                }
            }
        };

        resolved
            .mina
            .validate()
            .map_err(|e| TransactionBuilderError::Configuration(e.to_string()))?;
        if let Some(archive) = &resolved.archive {
            archive
                .validate()
                .map_err(|e| TransactionBuilderError::Configuration(e.to_string()))?;
        }
        Ok(resolved)
    }
}
