//! Column descriptors: the tagged identity carried by every table column.
//!
//! A descriptor flattens to `group|metric|key=value|key=value...`. The two
//! separators are reserved; construction rejects any part that contains
//! them, so `decode(encode(d)) == d` always holds for a built descriptor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const FIELD_SEP: char = '|';
pub const KV_SEP: char = '=';

pub const GROUP_OPERATIONS: &str = "Operations";
pub const GROUP_LATENCY: &str = "Latency";
pub const GROUP_DSTAT: &str = "dstat";
pub const GROUP_PERCENTILES: &str = "Percentiles";

pub const ATTR_WORKER: &str = "worker_id";
pub const ATTR_TEST: &str = "test_id";
pub const ATTR_AGENT: &str = "agent_id";
pub const ATTR_RUN: &str = "run_label";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ColumnDescriptor {
    group: String,
    metric_id: String,
    attributes: Vec<(String, String)>,
}

fn check_part(what: &str, part: &str) -> Result<()> {
    if part.contains(FIELD_SEP) || part.contains(KV_SEP) {
        return Err(Error::Format(format!(
            "{} {:?} contains a reserved separator ('{}' or '{}')",
            what, part, FIELD_SEP, KV_SEP
        )));
    }
    Ok(())
}

impl ColumnDescriptor {
    pub fn new(group: &str, metric_id: &str) -> Result<Self> {
        if group.is_empty() || metric_id.is_empty() {
            return Err(Error::Format(format!(
                "group and metric must be non-empty (group={:?}, metric={:?})",
                group, metric_id
            )));
        }
        check_part("group", group)?;
        check_part("metric", metric_id)?;
        Ok(Self {
            group: group.to_string(),
            metric_id: metric_id.to_string(),
            attributes: Vec::new(),
        })
    }

    /// Add or overwrite an attribute, keeping first-insertion order.
    pub fn with_attr(mut self, key: &str, value: &str) -> Result<Self> {
        check_part("attribute key", key)?;
        check_part("attribute value", value)?;
        self.set_attr(key, value);
        Ok(self)
    }

    fn set_attr(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }

    pub fn without_attr(&self, key: &str) -> Self {
        let mut out = self.clone();
        out.attributes.retain(|(k, _)| k != key);
        out
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.group.len() + self.metric_id.len() + 1);
        out.push_str(&self.group);
        out.push(FIELD_SEP);
        out.push_str(&self.metric_id);
        for (k, v) in &self.attributes {
            out.push(FIELD_SEP);
            out.push_str(k);
            out.push(KV_SEP);
            out.push_str(v);
        }
        out
    }

    pub fn decode(s: &str) -> Result<Self> {
        let mut tokens = s.split(FIELD_SEP);
        let (group, metric) = match (tokens.next(), tokens.next()) {
            (Some(g), Some(m)) => (g, m),
            _ => {
                return Err(Error::Format(format!(
                    "column {:?} needs at least group and metric",
                    s
                )))
            }
        };
        let mut desc = Self::new(group, metric)?;
        for token in tokens {
            let (key, value) = token.split_once(KV_SEP).ok_or_else(|| {
                Error::Format(format!("attribute {:?} in column {:?} has no '{}'", token, s, KV_SEP))
            })?;
            desc = desc.with_attr(key, value)?;
        }
        Ok(desc)
    }
}

impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ColumnDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl From<ColumnDescriptor> for String {
    fn from(d: ColumnDescriptor) -> String {
        d.encode()
    }
}

impl TryFrom<String> for ColumnDescriptor {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::decode(&s)
    }
}
