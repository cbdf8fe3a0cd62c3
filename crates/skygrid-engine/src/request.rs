//! Allocation requests and their validation.
//!
//! Validation happens before any side effect: a rejected request never
//! reaches the pools or the provisioner.

use serde_json::Value;

use skygrid_state::AllocationLimits;

use crate::error::{EngineError, EngineResult};

/// A validated request for a grid of `nodes` nodes owned by `team`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub team: String,
    pub nodes: u32,
}

impl AllocationRequest {
    /// Validate raw values against `limits`.
    pub fn new(node_count: i64, team: &str, limits: &AllocationLimits) -> EngineResult<Self> {
        if node_count < 1 || node_count > i64::from(limits.max_nodes) {
            return Err(EngineError::InvalidRequest(format!(
                "nodes must be between 1 and {}, got {node_count}",
                limits.max_nodes
            )));
        }
        let team_length = team.trim().chars().count();
        if team_length == 0 || team_length < limits.min_team_length {
            return Err(EngineError::InvalidRequest(format!(
                "team must be at least {} characters",
                limits.min_team_length.max(1)
            )));
        }
        Ok(Self {
            team: team.to_string(),
            nodes: node_count as u32,
        })
    }

    /// Parse `{"team": "...", "nodes": N}`.
    ///
    /// A missing field, a null, a non-string team, a node count that is not
    /// an integer, and malformed JSON are all `InvalidRequest`.
    pub fn from_json(body: &[u8], limits: &AllocationLimits) -> EngineResult<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| EngineError::InvalidRequest(format!("malformed body: {e}")))?;

        let team = match value.get("team") {
            Some(Value::String(team)) => team,
            Some(_) => return Err(EngineError::InvalidRequest("team must be a string".into())),
            None => return Err(EngineError::InvalidRequest("team is required".into())),
        };
        let nodes = match value.get("nodes") {
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                EngineError::InvalidRequest(format!("nodes must be an integer, got {n}"))
            })?,
            Some(_) => return Err(EngineError::InvalidRequest("nodes must be an integer".into())),
            None => return Err(EngineError::InvalidRequest("nodes is required".into())),
        };

        Self::new(nodes, team, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limits() -> AllocationLimits {
        AllocationLimits::default()
    }

    fn is_invalid(result: EngineResult<AllocationRequest>) -> bool {
        matches!(result, Err(EngineError::InvalidRequest(_)))
    }

    #[test]
    fn accepts_boundaries() {
        assert_eq!(AllocationRequest::new(1, "test", &limits()).unwrap().nodes, 1);
        assert_eq!(AllocationRequest::new(100, "123", &limits()).unwrap().nodes, 100);
    }

    #[test]
    fn rejects_out_of_range_node_counts() {
        assert!(is_invalid(AllocationRequest::new(0, "test", &limits())));
        assert!(is_invalid(AllocationRequest::new(101, "test", &limits())));
        assert!(is_invalid(AllocationRequest::new(-1, "test", &limits())));
    }

    #[test]
    fn rejects_short_teams() {
        assert!(is_invalid(AllocationRequest::new(1, "", &limits())));
        assert!(is_invalid(AllocationRequest::new(1, "ab", &limits())));
        assert!(is_invalid(AllocationRequest::new(1, "   ", &limits())));
    }

    #[test]
    fn limits_are_configuration() {
        let limits = AllocationLimits {
            max_nodes: 5,
            min_team_length: 1,
            ..AllocationLimits::default()
        };
        assert!(AllocationRequest::new(5, "x", &limits).is_ok());
        assert!(is_invalid(AllocationRequest::new(6, "x", &limits)));
    }

    #[test]
    fn parses_json_body() {
        let request =
            AllocationRequest::from_json(br#"{"team": "test", "nodes": 1}"#, &limits()).unwrap();
        assert_eq!(
            request,
            AllocationRequest {
                team: "test".into(),
                nodes: 1
            }
        );
    }

    #[test]
    fn rejects_json_shape_errors() {
        let bodies: [&[u8]; 9] = [
            b"",
            b"team=test&nodes=1",
            br#"{"nodes": 1}"#,
            br#"{"team": "test"}"#,
            br#"{"team": null, "nodes": 1}"#,
            br#"{"team": "test", "nodes": null}"#,
            br#"{"team": "test", "nodes": "1"}"#,
            br#"{"team": "test", "nodes": 1.5}"#,
            br#"{"team": 42, "nodes": 1}"#,
        ];
        for body in bodies {
            assert!(
                is_invalid(AllocationRequest::from_json(body, &limits())),
                "accepted {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    proptest! {
        #[test]
        fn node_count_outside_range_is_rejected(n in prop_oneof![i64::MIN..=0i64, 101i64..=i64::MAX]) {
            prop_assert!(is_invalid(AllocationRequest::new(n, "test", &limits())));
        }

        #[test]
        fn node_count_inside_range_is_accepted(n in 1i64..=100) {
            let request = AllocationRequest::new(n, "test", &limits()).unwrap();
            prop_assert_eq!(i64::from(request.nodes), n);
        }

        #[test]
        fn short_teams_are_rejected(team in "[a-z0-9]{0,2}", n in 1i64..=100) {
            prop_assert!(is_invalid(AllocationRequest::new(n, &team, &limits())));
        }

        #[test]
        fn fractional_node_counts_are_rejected(whole in -1000i64..1000, frac in 1u32..1000) {
            let body = format!(r#"{{"team": "test", "nodes": {whole}.{frac:03}}}"#);
            prop_assert!(is_invalid(AllocationRequest::from_json(body.as_bytes(), &limits())));
        }
    }
}
