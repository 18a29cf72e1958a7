//! Ledger value types and deterministic identity keys.
//!
//! Resources on the ledger are content-addressed: a subject is identified by a
//! SHA-256 key over its canonical URL, a relationship by a SHA-256 key over the
//! ordered (subject, predicate, object) triple. Two descriptors with the same
//! URL are the same subject regardless of name or description.

use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Amount in the ledger's smallest unit.
pub type Amount = u128;

/// Label hashed into the process-wide relationship predicate.
pub const CONTRIBUTED_TO_LABEL: &str = "has contributed to";

macro_rules! hash_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name([u8; 32]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Parse from hex, with or without a `0x` prefix.
            pub fn from_hex(s: &str) -> LedgerResult<Self> {
                let raw = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(raw).map_err(|e| {
                    LedgerError::invalid_input(format!("invalid hash '{}': {}", s, e))
                })?;
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                    LedgerError::invalid_input(format!("invalid hash '{}': expected 32 bytes", s))
                })?;
                Ok(Self(bytes))
            }

            fn digest(parts: &[&[u8]]) -> Self {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                Self(hasher.finalize().into())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = LedgerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_hex(&value)
            }
        }
    };
}

hash_newtype!(
    /// Content-addressed identifier of a subject, relationship or stake position.
    ResourceId
);

hash_newtype!(
    /// Transaction reference. The all-zero value is the "no transaction" sentinel.
    TxRef
);

impl ResourceId {
    /// Identifier of the stake position (vault) backing this resource.
    pub fn stake_id(&self) -> ResourceId {
        ResourceId::digest(&[b"stake:", &self.0])
    }
}

impl TxRef {
    /// Sentinel reported when no transaction was submitted.
    pub const EMPTY: TxRef = TxRef([0u8; 32]);

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Deterministic tx ref over a sender-local nonce and an operation label.
    pub fn derive(nonce: u64, operation: &str, target: &ResourceId) -> TxRef {
        TxRef::digest(&[&nonce.to_be_bytes(), operation.as_bytes(), target.as_bytes()])
    }
}

/// The predicate linking a contributor subject to a project subject.
pub fn contributed_to_predicate() -> ResourceId {
    ResourceId::digest(&[b"predicate:", CONTRIBUTED_TO_LABEL.as_bytes()])
}

/// Canonical form of a subject URL: trimmed, scheme and host lowercased,
/// a single trailing slash removed.
pub fn canonical_url(url: &str) -> String {
    let trimmed = url.trim();
    let canonical = match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.find('/') {
                Some(idx) => rest.split_at(idx),
                None => (rest, ""),
            };
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => trimmed.to_string(),
    };
    match canonical.strip_suffix('/') {
        Some(stripped) if !stripped.ends_with(':') && !stripped.ends_with('/') => {
            stripped.to_string()
        }
        _ => canonical,
    }
}

/// Identity key of a subject with the given URL.
pub fn subject_key(url: &str) -> ResourceId {
    ResourceId::digest(&[b"subject:", canonical_url(url).as_bytes()])
}

/// Identity key of the ordered triple (subject, predicate, object).
pub fn relationship_key(
    subject: &ResourceId,
    predicate: &ResourceId,
    object: &ResourceId,
) -> ResourceId {
    ResourceId::digest(&[
        b"relationship:",
        subject.as_bytes(),
        predicate.as_bytes(),
        object.as_bytes(),
    ])
}

/// Funding identity of the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declarative payload of a subject resource (project or contributor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl SubjectDescriptor {
    /// Identity key; depends on `url` only.
    pub fn key(&self) -> ResourceId {
        subject_key(&self.url)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::invalid_input("subject name is empty"));
        }
        if self.url.trim().is_empty() {
            return Err(LedgerError::invalid_input(format!(
                "subject '{}' has no url",
                self.name
            )));
        }
        Ok(())
    }
}

/// A (subject, predicate, object) relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub subject_id: ResourceId,
    pub predicate_id: ResourceId,
    pub object_id: ResourceId,
}

impl RelationshipDescriptor {
    /// Relationship "`subject` has contributed to `object`".
    pub fn contributed_to(subject_id: ResourceId, object_id: ResourceId) -> Self {
        Self {
            subject_id,
            predicate_id: contributed_to_predicate(),
            object_id,
        }
    }

    pub fn key(&self) -> ResourceId {
        relationship_key(&self.subject_id, &self.predicate_id, &self.object_id)
    }
}

/// A contributor as reported by the data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorDescriptor {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub contact_key: String,
    pub profile_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ContributorDescriptor {
    /// Subject payload representing this contributor.
    pub fn to_subject(&self) -> SubjectDescriptor {
        let description = match &self.handle {
            Some(handle) => format!("Contributor @{}", handle),
            None => format!("Contributor {}", self.contact_key),
        };
        SubjectDescriptor {
            name: self.display_name.clone(),
            description,
            url: self.profile_url.clone(),
            image: self.image_url.clone(),
        }
    }

    /// Label used in outcomes and log events.
    pub fn label(&self) -> &str {
        self.handle.as_deref().unwrap_or(&self.display_name)
    }
}

/// Result of a resource-creating transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Created {
    pub id: ResourceId,
    pub tx_ref: TxRef,
}

/// Result of a stake deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deposited {
    pub tx_ref: TxRef,
}

/// Confirmation status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub confirmed: bool,
    pub block_ref: u64,
}
