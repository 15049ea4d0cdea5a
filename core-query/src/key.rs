use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key: a resource name plus the ordered request parameters.
///
/// Two keys are equal only when the resource and every parameter match in
/// order, so `("search", "")` and `("search",)` are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    resource: String,
    params: Vec<String>,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: impl ToString) -> Self {
        self.params.push(param.to_string());
        self
    }

    pub fn with_params<I, P>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: ToString,
    {
        self.params
            .extend(params.into_iter().map(|param| param.to_string()));
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}[{}]", self.resource, self.params.join(","))
        }
    }
}
