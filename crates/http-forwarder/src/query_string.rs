use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

// Everything but alphanumerics and `-_.!~*'()` is escaped, matching URI component encoding.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Serializes `key=value` pairs into a query string, in the order given.
///
/// Keys and values are percent-encoded as URI components, so a space becomes `%20` rather
/// than `+`. Repeated keys are kept as separate pairs.
pub fn encode_query<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut query = String::new();

    for (key, value) in params {
        if !query.is_empty() {
            query.push('&');
        }

        query.extend(utf8_percent_encode(key.as_ref(), URI_COMPONENT));
        query.push('=');
        query.extend(utf8_percent_encode(value.as_ref(), URI_COMPONENT));
    }

    query
}
