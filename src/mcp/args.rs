//! Typed tool arguments
//!
//! Built from argument maps that already passed schema validation, so kind
//! mismatches here are reported but not expected.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::catalog::ParamSpec;
use crate::error::{FmpError, Result};
use crate::upstream::{HttpMethod, Pagination};

/// Upper bound on pages walked in one call
pub const MAX_PAGES: u32 = 50;

/// Arguments that steer the call instead of becoming query parameters
const CONTROL_PARAMS: &[&str] = &["params", "paginate", "page_param", "start_page", "max_pages"];

/// Arguments of the generic request tool
#[derive(Debug, Clone, PartialEq)]
pub struct RequestArgs {
    pub method: HttpMethod,
    pub path: String,
    pub params: Map<String, Value>,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    pub pagination: Option<Pagination>,
}

impl RequestArgs {
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let method = match opt_str(args, "method")? {
            Some(m) => m.parse()?,
            None => HttpMethod::Get,
        };
        let path = opt_str(args, "path")?
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| FmpError::InvalidParams("path must not be empty".into()))?;

        let headers = opt_object(args, "headers")?
            .into_iter()
            .map(|(name, value)| match value {
                Value::String(s) => Ok((name, s)),
                Value::Number(n) => Ok((name, n.to_string())),
                Value::Bool(b) => Ok((name, b.to_string())),
                _ => Err(FmpError::InvalidParams(format!(
                    "header {} must be a string",
                    name
                ))),
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            method,
            path,
            params: opt_object(args, "params")?,
            body: args.get("body").filter(|b| !b.is_null()).cloned(),
            headers,
            pagination: pagination(args)?,
        })
    }
}

/// Arguments of a fixed-endpoint tool, flattened to query parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointArgs {
    pub params: Map<String, Value>,
    pub pagination: Option<Pagination>,
}

impl EndpointArgs {
    /// Named arguments override entries of the free-form `params` object
    pub fn from_args(specs: &[ParamSpec], args: &Map<String, Value>) -> Result<Self> {
        let mut params = opt_object(args, "params")?;
        for (name, value) in args {
            if CONTROL_PARAMS.contains(&name.as_str()) || value.is_null() {
                continue;
            }
            if !specs.iter().any(|s| &s.name == name) {
                tracing::debug!(arg = %name, "forwarding undeclared argument as query parameter");
            }
            params.insert(name.clone(), value.clone());
        }
        Ok(Self {
            params,
            pagination: pagination(args)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEndpointsArgs {
    pub category: Option<String>,
    pub run_check: bool,
}

impl ListEndpointsArgs {
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            category: opt_str(args, "category")?
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from),
            run_check: opt_bool(args, "run_check")?.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestEndpointArgs {
    pub service: String,
    pub endpoint: String,
    pub params: Map<String, Value>,
}

impl TestEndpointArgs {
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            service: opt_str(args, "service")?.unwrap_or("stable").to_string(),
            endpoint: required_str(args, "endpoint")?,
            params: opt_object(args, "params")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchArgs {
    pub query: String,
    pub limit: u64,
}

impl SearchArgs {
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            query: required_str(args, "query")?,
            limit: opt_u64(args, "limit")?.unwrap_or(5).clamp(1, 100),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchArgs {
    /// Upper-cased ticker symbol
    pub id: String,
}

impl FetchArgs {
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            id: required_str(args, "id")?.to_ascii_uppercase(),
        })
    }
}

fn pagination(args: &Map<String, Value>) -> Result<Option<Pagination>> {
    if !opt_bool(args, "paginate")?.unwrap_or(false) {
        return Ok(None);
    }
    let defaults = Pagination::default();
    let max_pages = opt_u64(args, "max_pages")?
        .map(|n| n.clamp(1, u64::from(MAX_PAGES)) as u32)
        .unwrap_or(defaults.max_pages);
    Ok(Some(Pagination {
        page_param: opt_str(args, "page_param")?
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .unwrap_or(defaults.page_param),
        start_page: opt_u64(args, "start_page")?.unwrap_or(defaults.start_page),
        max_pages,
    }))
}

fn opt_str<'a>(args: &'a Map<String, Value>, name: &str) -> Result<Option<&'a str>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(FmpError::InvalidParams(format!("{} must be a string", name))),
    }
}

fn required_str(args: &Map<String, Value>, name: &str) -> Result<String> {
    opt_str(args, name)?
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| FmpError::InvalidParams(format!("missing required argument: {}", name)))
}

fn opt_bool(args: &Map<String, Value>, name: &str) -> Result<Option<bool>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(FmpError::InvalidParams(format!("{} must be a boolean", name))),
    }
}

fn opt_u64(args: &Map<String, Value>, name: &str) -> Result<Option<u64>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            FmpError::InvalidParams(format!("{} must be a non-negative integer", name))
        }),
    }
}

fn opt_object(args: &Map<String, Value>, name: &str) -> Result<Map<String, Value>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(FmpError::InvalidParams(format!("{} must be an object", name))),
    }
}
