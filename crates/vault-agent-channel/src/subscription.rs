//! WS connection URL construction.

/// Subscription and identity parameters carried as query parameters on the
/// initial WS upgrade request (spec §4.5).
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub api_key: String,
    pub hostname: String,
    pub version: String,
    pub platform: String,
    pub cert_ids: Vec<String>,
    pub secret_ids: Vec<String>,
    pub update_channel: String,
}

/// Build the full `/v1/ws/agent` URL from a `ws://`/`wss://` base and the
/// current connection parameters.
pub fn build_ws_url(base_url: &str, params: &ConnectParams) -> Result<url::Url, url::ParseError> {
    let mut url = url::Url::parse(base_url)?.join("/v1/ws/agent")?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("apiKey", &params.api_key);
        query.append_pair("hostname", &params.hostname);
        query.append_pair("version", &params.version);
        query.append_pair("platform", &params.platform);
        query.append_pair("updateChannel", &params.update_channel);
        if !params.cert_ids.is_empty() {
            query.append_pair("certIds", &params.cert_ids.join(","));
        }
        if !params.secret_ids.is_empty() {
            query.append_pair("secretIds", &params.secret_ids.join(","));
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_subscriptions_and_identity_as_query_params() {
        let params = ConnectParams {
            api_key: "key-1".to_string(),
            hostname: "host-a".to_string(),
            version: "1.0.0".to_string(),
            platform: "linux".to_string(),
            cert_ids: vec!["c1".to_string(), "c2".to_string()],
            secret_ids: vec!["s1".to_string()],
            update_channel: "stable".to_string(),
        };

        let url = build_ws_url("wss://vault.internal", &params).unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(query.get("certIds").unwrap(), "c1,c2");
        assert_eq!(query.get("secretIds").unwrap(), "s1");
        assert_eq!(query.get("updateChannel").unwrap(), "stable");
        assert_eq!(query.get("apiKey").unwrap(), "key-1");
        assert_eq!(url.path(), "/v1/ws/agent");
    }

    #[test]
    fn empty_subscription_lists_are_omitted() {
        let params = ConnectParams {
            api_key: "key-1".to_string(),
            hostname: "host-a".to_string(),
            version: "1.0.0".to_string(),
            platform: "linux".to_string(),
            cert_ids: Vec::new(),
            secret_ids: Vec::new(),
            update_channel: "stable".to_string(),
        };

        let url = build_ws_url("wss://vault.internal", &params).unwrap();
        assert!(!url.query().unwrap().contains("certIds"));
        assert!(!url.query().unwrap().contains("secretIds"));
    }
}
