//! OAuth token sets and the token endpoint's response shape.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Access and refresh tokens for one account mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// The access token for API requests.
    pub access_token: String,

    /// Long-lived grant used to mint new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token stops being accepted.
    #[serde(with = "expiry_date")]
    pub expiry_date: DateTime<Utc>,

    /// Granted scopes.
    #[serde(default, with = "scope_list")]
    pub scope: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl TokenSet {
    /// Builds a token set from a code-exchange response.
    ///
    /// `requested_scopes` fills in the scope when the provider does not echo it.
    pub fn from_response(
        response: TokenResponse,
        requested_scopes: &[String],
        now: DateTime<Utc>,
    ) -> Self {
        let scope = match response.scope.as_deref() {
            Some(granted) if !granted.trim().is_empty() => parse_scope(granted),
            _ => requested_scopes.iter().cloned().collect(),
        };
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expiry_date: expiry_from(now, response.expires_in),
            scope,
            token_type: response.token_type,
        }
    }

    /// Merges a refresh-exchange response into this set.
    ///
    /// Providers usually do not reissue refresh tokens, so the existing one is
    /// kept unless a new one arrives.
    pub fn apply_refresh(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = response.access_token;
        self.expiry_date = expiry_from(now, response.expires_in);
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(granted) = response.scope.as_deref()
            && !granted.trim().is_empty()
        {
            self.scope = parse_scope(granted);
        }
        if response.token_type.is_some() {
            self.token_type = response.token_type;
        }
    }

    /// Returns true if the token is still valid `margin` from `now`.
    pub fn is_valid_for(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expiry_date > now + margin
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date <= now
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scope.contains(scope))
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expiry_date - now
    }
}

/// Response body of Google's token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

fn expiry_from(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let expiry = now + Duration::seconds(expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
    truncate_to_millis(expiry)
}

/// Drops sub-millisecond precision so the value survives the epoch-millis
/// file format unchanged.
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(at.timestamp_millis())
        .single()
        .unwrap_or(at)
}

fn parse_scope(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// `expiry_date` is written as epoch milliseconds and accepted as either
/// epoch milliseconds or an RFC 3339 string.
mod expiry_date {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Float(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let millis = match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => ms,
            Raw::Float(ms) => ms as i64,
            Raw::Text(text) => {
                return DateTime::parse_from_rfc3339(&text)
                    .map(|dt| super::truncate_to_millis(dt.with_timezone(&Utc)))
                    .map_err(|e| de::Error::custom(format!("invalid expiry_date '{text}': {e}")));
            }
        };
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| de::Error::custom(format!("expiry_date out of range: {millis}")))
    }
}

/// `scope` is written as Google's space-separated string and accepted as
/// either that string or an array.
mod scope_list {
    use std::collections::BTreeSet;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        List(Vec<String>),
    }

    pub fn serialize<S: Serializer>(
        value: &BTreeSet<String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let joined = value.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
        serializer.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeSet<String>, D::Error> {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Joined(text) => super::parse_scope(&text),
            Raw::List(items) => items.into_iter().filter(|s| !s.is_empty()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALENDAR: &str = "https://www.googleapis.com/auth/calendar";

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn response(access: &str, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(3599),
            scope: Some(CALENDAR.to_string()),
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn from_response_computes_expiry() {
        let now = at(1_700_000_000_000);
        let tokens = TokenSet::from_response(response("a", Some("r")), &[], now);
        assert_eq!(tokens.expiry_date, at(1_700_000_000_000 + 3_599_000));
        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
        assert!(tokens.scope.contains(CALENDAR));
    }

    #[test]
    fn from_response_falls_back_to_requested_scopes() {
        let mut body = response("a", None);
        body.scope = None;
        let tokens = TokenSet::from_response(body, &[CALENDAR.to_string()], Utc::now());
        assert!(tokens.has_scopes(&[CALENDAR.to_string()]));
    }

    #[test]
    fn refresh_keeps_refresh_token_when_omitted() {
        let now = at(1_700_000_000_000);
        let mut tokens = TokenSet::from_response(response("old", Some("keep-me")), &[], now);
        tokens.apply_refresh(response("new", None), now + Duration::hours(1));
        assert_eq!(tokens.access_token, "new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("keep-me"));
    }

    #[test]
    fn refresh_takes_rotated_refresh_token() {
        let now = Utc::now();
        let mut tokens = TokenSet::from_response(response("old", Some("r1")), &[], now);
        tokens.apply_refresh(response("new", Some("r2")), now);
        assert_eq!(tokens.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn validity_respects_margin() {
        let now = at(1_700_000_000_000);
        let mut tokens = TokenSet::from_response(response("a", None), &[], now);
        tokens.expiry_date = now + Duration::seconds(30);
        assert!(!tokens.is_valid_for(Duration::seconds(60), now));
        assert!(tokens.is_valid_for(Duration::seconds(10), now));
        assert!(!tokens.is_expired(now));
    }

    #[test]
    fn expiry_accepts_millis_and_rfc3339() {
        let from_millis: TokenSet = serde_json::from_str(
            r#"{"access_token":"a","expiry_date":1700000000000,"scope":"x y"}"#,
        )
        .unwrap();
        let from_text: TokenSet = serde_json::from_str(
            r#"{"access_token":"a","expiry_date":"2023-11-14T22:13:20Z","scope":["y","x"]}"#,
        )
        .unwrap();
        assert_eq!(from_millis, from_text);
        assert_eq!(from_millis.expiry_date, at(1_700_000_000_000));
    }

    #[test]
    fn invalid_expiry_is_rejected() {
        let result: Result<TokenSet, _> =
            serde_json::from_str(r#"{"access_token":"a","expiry_date":"tomorrow"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn serialized_form_is_canonical() {
        let tokens = TokenSet {
            access_token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry_date: at(1_700_000_000_000),
            scope: ["b", "a"].into_iter().map(String::from).collect(),
            token_type: Some("Bearer".to_string()),
        };
        let json = serde_json::to_string_pretty(&tokens).unwrap();
        insta::assert_snapshot!(json, @r#"
        {
          "access_token": "ya29.access",
          "refresh_token": "1//refresh",
          "expiry_date": 1700000000000,
          "scope": "a b",
          "token_type": "Bearer"
        }
        "#);
    }
}
