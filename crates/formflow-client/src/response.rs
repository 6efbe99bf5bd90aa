//! Response envelope returned by every resource read

use crate::error::{ClientError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of an HTTP exchange that reached the server
///
/// HTTP-level failures are reported here with `ok == false` instead of as
/// errors, so callers keep the server-supplied body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the status was 2xx
    pub ok: bool,
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body (`null` for empty bodies)
    pub data: Value,
}

impl ApiResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            ok: (200..300).contains(&status),
            status,
            data,
        }
    }

    /// Turn a non-2xx response into `ClientError::Response`
    pub fn into_result(self) -> Result<Value> {
        if self.ok {
            Ok(self.data)
        } else {
            Err(ClientError::Response(self))
        }
    }

    /// Deserialize the body of a successful response
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let data = self.into_result()?;
        Ok(serde_json::from_value(data)?)
    }

    /// Whether the body follows the paginated `{results, count}` shape
    pub fn is_paginated(&self) -> bool {
        self.data.get("results").map_or(false, Value::is_array) && self.data.get("count").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_follows_status_class() {
        assert!(ApiResponse::new(201, Value::Null).ok);
        assert!(!ApiResponse::new(400, Value::Null).ok);
        assert!(!ApiResponse::new(302, Value::Null).ok);
    }

    #[test]
    fn test_into_result_keeps_failed_response() {
        let response = ApiResponse::new(400, json!({"invalidParams": []}));
        match response.clone().into_result() {
            Err(ClientError::Response(r)) => assert_eq!(r, response),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_paginated_shape_needs_results_and_count() {
        assert!(ApiResponse::new(200, json!({"results": [], "count": 0})).is_paginated());
        assert!(!ApiResponse::new(200, json!({"results": []})).is_paginated());
        assert!(!ApiResponse::new(200, json!({"count": 3})).is_paginated());
        assert!(!ApiResponse::new(200, json!([1, 2])).is_paginated());
    }
}
