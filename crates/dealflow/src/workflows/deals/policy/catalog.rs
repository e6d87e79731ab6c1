use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use super::{IncentivePolicy, PolicyError, PolicyId};
use crate::workflows::deals::repository::{PolicyStore, RepositoryError};

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Csv(csv::Error),
    Field {
        row: usize,
        column: &'static str,
        value: String,
    },
    Policy(PolicyError),
    Unavailable,
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "failed to read policy catalog: {}", err),
            CatalogError::Csv(err) => write!(f, "invalid policy catalog CSV: {}", err),
            CatalogError::Field { row, column, value } => write!(
                f,
                "policy catalog row {} has an invalid {} value '{}'",
                row, column, value
            ),
            CatalogError::Policy(err) => write!(f, "policy catalog rejected: {}", err),
            CatalogError::Unavailable => write!(f, "policy catalog lock poisoned"),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Io(err) => Some(err),
            CatalogError::Csv(err) => Some(err),
            CatalogError::Policy(err) => Some(err),
            CatalogError::Field { .. } | CatalogError::Unavailable => None,
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<PolicyError> for CatalogError {
    fn from(err: PolicyError) -> Self {
        Self::Policy(err)
    }
}

/// In-process policy store. Every stored policy has passed validation.
#[derive(Debug, Default)]
pub struct PolicyCatalog {
    policies: RwLock<BTreeMap<PolicyId, IncentivePolicy>>,
}

impl PolicyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies<I>(policies: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = IncentivePolicy>,
    {
        let catalog = Self::new();
        for policy in policies {
            catalog.upsert(policy)?;
        }
        Ok(catalog)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let catalog = Self::new();
        for (index, row) in csv_reader.deserialize::<PolicyRow>().enumerate() {
            let policy = row?.into_policy(index + 1)?;
            catalog.upsert(policy)?;
        }
        Ok(catalog)
    }

    /// Insert or replace a policy. Replacing bumps the stored version.
    pub fn upsert(&self, mut policy: IncentivePolicy) -> Result<IncentivePolicy, CatalogError> {
        policy.validate()?;
        let mut guard = self
            .policies
            .write()
            .map_err(|_| CatalogError::Unavailable)?;
        if let Some(existing) = guard.get(&policy.id) {
            policy.version = policy.version.max(existing.version + 1);
        }
        guard.insert(policy.id, policy.clone());
        Ok(policy)
    }

    /// Retire a policy from resolution while keeping it addressable by id.
    pub fn deactivate(&self, id: PolicyId) -> Result<bool, CatalogError> {
        let mut guard = self
            .policies
            .write()
            .map_err(|_| CatalogError::Unavailable)?;
        match guard.get_mut(&id) {
            Some(policy) if policy.active => {
                policy.active = false;
                policy.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.policies.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PolicyStore for PolicyCatalog {
    fn candidates(&self) -> Result<Vec<IncentivePolicy>, RepositoryError> {
        let guard = self
            .policies
            .read()
            .map_err(|_| RepositoryError::Unavailable("policy catalog lock poisoned".into()))?;
        Ok(guard.values().filter(|policy| policy.active).cloned().collect())
    }

    fn fetch(&self, id: PolicyId) -> Result<Option<IncentivePolicy>, RepositoryError> {
        let guard = self
            .policies
            .read()
            .map_err(|_| RepositoryError::Unavailable("policy catalog lock poisoned".into()))?;
        Ok(guard.get(&id).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct PolicyRow {
    id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    commission_rate: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    min_deal_amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    max_deal_amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    bonus_threshold: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    bonus_amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    active: Option<String>,
}

impl PolicyRow {
    fn into_policy(self, row: usize) -> Result<IncentivePolicy, CatalogError> {
        let decimal = |column: &'static str, raw: &str| {
            Decimal::from_str(raw).map_err(|_| CatalogError::Field {
                row,
                column,
                value: raw.to_string(),
            })
        };
        let optional = |column: &'static str, raw: Option<String>| {
            raw.map(|value| decimal(column, &value)).transpose()
        };

        let active = match self.active.as_deref().map(str::to_ascii_lowercase) {
            None => true,
            Some(value) => match value.as_str() {
                "true" | "yes" | "1" | "active" => true,
                "false" | "no" | "0" | "inactive" => false,
                _ => {
                    return Err(CatalogError::Field {
                        row,
                        column: "active",
                        value: value.clone(),
                    })
                }
            },
        };

        Ok(IncentivePolicy {
            id: PolicyId(self.id),
            title: self.title,
            description: self.description.unwrap_or_default(),
            commission_rate: decimal("commission_rate", &self.commission_rate)?,
            min_deal_amount: optional("min_deal_amount", self.min_deal_amount)?,
            max_deal_amount: optional("max_deal_amount", self.max_deal_amount)?,
            bonus_threshold: optional("bonus_threshold", self.bonus_threshold)?,
            bonus_amount: optional("bonus_amount", self.bonus_amount)?,
            active,
            version: 1,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
