use std::collections::BTreeMap;

use http_forwarder::{ForwardError, InboundRequest, OutboundResponse};
use serde::{Deserialize, Serialize};

/// A proxied request as the API gateway describes it.
///
/// `headers` and `queryStringParameters` may be objects, `null` or missing. Entries keep the
/// order they have in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub path: String,
    pub http_method: String,
    #[serde(default, with = "ordered_pairs")]
    pub headers: Vec<(String, String)>,
    #[serde(default, with = "ordered_pairs")]
    pub query_string_parameters: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<String>,
}

impl From<InboundEvent> for InboundRequest {
    fn from(event: InboundEvent) -> InboundRequest {
        InboundRequest {
            method: event.http_method,
            path: event.path,
            headers: event.headers,
            query_parameters: event.query_string_parameters,
            body: event.body,
        }
    }
}

/// What goes back to the gateway, for a relayed reply and a failed exchange alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl From<OutboundResponse> for EventResponse {
    fn from(response: OutboundResponse) -> EventResponse {
        EventResponse {
            status_code: response.status_code,
            headers: response.headers,
            body: response.body,
        }
    }
}

impl From<&ForwardError> for EventResponse {
    fn from(error: &ForwardError) -> EventResponse {
        EventResponse {
            status_code: error.status_code().as_u16(),
            headers: BTreeMap::new(),
            body: error.message(),
        }
    }
}

mod ordered_pairs {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(pairs.iter().map(|(key, value)| (key, value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(PairsVisitor)
    }

    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an object of string values or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_map(self)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));

            while let Some(pair) = map.next_entry::<String, String>()? {
                pairs.push(pair);
            }

            Ok(pairs)
        }
    }
}
