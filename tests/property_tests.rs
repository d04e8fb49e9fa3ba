//! Property-based tests for fmp-mcp
//!
//! These tests verify invariants that must hold for all inputs:
//! - The server key is injected when absent and never overwrites a caller key
//! - Path normalization never panics and always yields a rooted path
//! - Schema validation never panics on arbitrary JSON
//! - The rate limiter never hands out more than its capacity
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;
use serde_json::{Map, Value};

// ============================================================================
// URL BUILDER TESTS
// ============================================================================

mod url_builder_tests {
    use super::*;
    use fmp_mcp::upstream::url::{is_key_param, KEY_PARAM_NAMES};
    use fmp_mcp::upstream::{normalize_path, UrlBuilder};
    use url::Url;

    const SERVER_KEY: &str = "server-secret";

    fn builder() -> UrlBuilder {
        UrlBuilder::new("https://financialmodelingprep.com", Some(SERVER_KEY.into())).unwrap()
    }

    fn pairs(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    proptest! {
        /// Invariant: normalize_path never panics and always yields a rooted path
        #[test]
        fn normalize_never_panics(s in "\\PC{0,80}") {
            let normalized = normalize_path(&s);
            prop_assert!(normalized.starts_with('/'));
        }

        /// Invariant: with no caller key, exactly one apikey carrying the server key is added
        #[test]
        fn injects_when_absent(
            endpoint in "[a-z][a-z-]{0,20}",
            extra in proptest::collection::btree_map("[a-z]{1,8}", "[A-Za-z0-9]{0,8}", 0..4),
        ) {
            let mut params = Map::new();
            for (k, v) in extra.iter().filter(|(k, _)| !is_key_param(k)) {
                params.insert(k.clone(), Value::String(v.clone()));
            }
            let url = builder().build(&endpoint, &params).unwrap();
            let keys: Vec<_> = pairs(&url).into_iter().filter(|(k, _)| k == "apikey").collect();
            prop_assert_eq!(keys.len(), 1);
            prop_assert_eq!(keys[0].1.as_str(), SERVER_KEY);
        }

        /// Invariant: a caller-supplied key under any recognized name is never overwritten
        #[test]
        fn never_overwrites_caller_key(
            idx in 0..KEY_PARAM_NAMES.len(),
            upper in any::<bool>(),
            caller_key in "[A-Za-z0-9]{1,16}",
        ) {
            let name = if upper {
                KEY_PARAM_NAMES[idx].to_ascii_uppercase()
            } else {
                KEY_PARAM_NAMES[idx].to_string()
            };
            let mut params = Map::new();
            params.insert(name.clone(), Value::String(caller_key.clone()));

            let url = builder().build("v3/quote/AAPL", &params).unwrap();
            let found = pairs(&url);
            prop_assert!(found.iter().all(|(_, v)| v != SERVER_KEY));
            prop_assert!(found.iter().any(|(k, v)| k == &name && v == &caller_key));
        }

        /// Invariant: the builder only ever targets the configured host
        #[test]
        fn host_is_fixed(path in "\\PC{1,60}") {
            if let Ok(url) = builder().build(&path, &Map::new()) {
                let parsed = Url::parse(&url).unwrap();
                prop_assert_eq!(parsed.host_str(), Some("financialmodelingprep.com"));
            }
        }
    }
}

// ============================================================================
// SCHEMA VALIDATION TESTS
// ============================================================================

mod schema_tests {
    use super::*;
    use fmp_mcp::catalog::schema::validate;
    use fmp_mcp::catalog::seed::seed_tools;

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "\\PC{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::btree_map("[a-z_]{1,10}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        /// Invariant: validation returns Ok or InvalidParams for any input, never panics
        #[test]
        fn never_panics(args in arb_json()) {
            for tool in seed_tools() {
                if let Err(e) = validate(&tool.params, &args) {
                    prop_assert_eq!(e.code(), -32602);
                }
            }
        }

        /// Invariant: accepted arguments always contain every required parameter
        #[test]
        fn accepted_args_have_required(args in arb_json()) {
            for tool in seed_tools() {
                if let Ok(validated) = validate(&tool.params, &args) {
                    for spec in tool.params.iter().filter(|p| p.required) {
                        prop_assert!(validated.get(&spec.name).is_some_and(|v| !v.is_null()));
                    }
                }
            }
        }
    }
}

// ============================================================================
// RATE LIMITER TESTS
// ============================================================================

mod rate_limit_tests {
    use super::*;
    use fmp_mcp::upstream::RateLimiter;
    use std::time::Duration;

    proptest! {
        /// Invariant: within one window no more than `capacity` calls succeed
        #[test]
        fn bounded_by_capacity(capacity in 1u32..50, attempts in 0usize..120) {
            let limiter = RateLimiter::new(capacity, Duration::from_secs(3600));
            let granted = (0..attempts).filter(|_| limiter.try_acquire().is_ok()).count();
            prop_assert!(granted <= capacity as usize);
            prop_assert!(limiter.available() <= capacity);
        }
    }
}
