use std::error::Error;

use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::error::StoreError;

/// How payloads are laid out in the `json` column.
///
/// Fixed for the lifetime of a storage instance and checked against the
/// schema during bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Plain `TEXT` column; payloads are serialized and parsed by this crate.
    #[default]
    TextJson,
    /// `JSONB` column validated by the server and indexed with GIN.
    NativeJson,
}

impl Encoding {
    #[must_use]
    pub fn from_use_jsonb(use_jsonb: bool) -> Self {
        if use_jsonb {
            Encoding::NativeJson
        } else {
            Encoding::TextJson
        }
    }

    /// Column type used in `CREATE TABLE`.
    #[must_use]
    pub fn column_type(self) -> &'static str {
        match self {
            Encoding::TextJson => "TEXT",
            Encoding::NativeJson => "JSONB",
        }
    }

    /// Type name as reported by `information_schema.columns.data_type`.
    #[must_use]
    pub fn catalog_type(self) -> &'static str {
        match self {
            Encoding::TextJson => "text",
            Encoding::NativeJson => "jsonb",
        }
    }

    /// Turn a payload into the value bound for the `json` column.
    ///
    /// # Errors
    /// Returns `StoreError::Codec` if the payload cannot be serialized.
    pub fn encode(self, payload: &Value) -> Result<StoredJson, StoreError> {
        match self {
            Encoding::NativeJson => Ok(StoredJson::Native(payload.clone())),
            Encoding::TextJson => serde_json::to_string(payload)
                .map(StoredJson::Text)
                .map_err(|source| StoreError::Codec {
                    context: "encoding payload as text".to_string(),
                    source,
                }),
        }
    }

    /// Read the `json` column at `idx` in the representation this encoding stores.
    ///
    /// # Errors
    /// Returns the driver error if the column has an unexpected type or is NULL.
    pub fn read_column(self, row: &Row, idx: usize) -> Result<StoredJson, tokio_postgres::Error> {
        match self {
            Encoding::NativeJson => row.try_get::<_, Value>(idx).map(StoredJson::Native),
            Encoding::TextJson => row.try_get::<_, String>(idx).map(StoredJson::Text),
        }
    }

    /// Turn a stored column value back into a payload.
    ///
    /// # Errors
    /// Returns `StoreError::Codec` if text cannot be parsed as JSON, or if the
    /// stored representation does not belong to this encoding.
    pub fn decode(self, stored: StoredJson) -> Result<Value, StoreError> {
        match (self, stored) {
            (Encoding::NativeJson, StoredJson::Native(value)) => Ok(value),
            (Encoding::TextJson, StoredJson::Text(text)) => {
                serde_json::from_str(&text).map_err(|source| StoreError::Codec {
                    context: "parsing stored text payload".to_string(),
                    source,
                })
            }
            (encoding, stored) => Err(StoreError::Codec {
                context: format!("decoding {stored:?} with {encoding:?}"),
                source: serde::de::Error::custom("stored representation does not match encoding"),
            }),
        }
    }
}

/// A payload in its column representation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredJson {
    Native(Value),
    Text(String),
}

impl ToSql for StoredJson {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            StoredJson::Native(value) if <Value as ToSql>::accepts(ty) => value.to_sql(ty, out),
            StoredJson::Text(text) if <String as ToSql>::accepts(ty) => text.to_sql(ty, out),
            other => Err(format!("cannot bind {other:?} to a column of type {ty}").into()),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::JSON | Type::JSONB | Type::TEXT | Type::VARCHAR)
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_mode_serializes_and_parses() {
        let payload = json!({"id": "T1", "name": "Acme", "nested": {"n": [1, 2, 3]}});
        let stored = Encoding::TextJson.encode(&payload).unwrap();
        let StoredJson::Text(ref text) = stored else {
            panic!("expected text, got {stored:?}");
        };
        assert!(text.contains("\"name\":\"Acme\""));
        assert_eq!(Encoding::TextJson.decode(stored).unwrap(), payload);
    }

    #[test]
    fn native_mode_passes_value_through() {
        let payload = json!({"id": "U1", "admin": true});
        let stored = Encoding::NativeJson.encode(&payload).unwrap();
        assert_eq!(stored, StoredJson::Native(payload.clone()));
        assert_eq!(Encoding::NativeJson.decode(stored).unwrap(), payload);
    }

    #[test]
    fn corrupt_text_is_a_codec_error() {
        let err = Encoding::TextJson
            .decode(StoredJson::Text("{not json".into()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Codec);
    }

    #[test]
    fn mismatched_representation_is_rejected() {
        let err = Encoding::NativeJson
            .decode(StoredJson::Text("{}".into()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Codec);
    }

    #[test]
    fn schema_names_follow_encoding() {
        assert_eq!(Encoding::from_use_jsonb(true), Encoding::NativeJson);
        assert_eq!(Encoding::from_use_jsonb(false), Encoding::TextJson);
        assert_eq!(Encoding::default(), Encoding::TextJson);
        assert_eq!(Encoding::NativeJson.column_type(), "JSONB");
        assert_eq!(Encoding::TextJson.catalog_type(), "text");
    }

    #[test]
    fn binding_checks_the_column_type() {
        let mut out = bytes::BytesMut::new();
        let text = StoredJson::Text("{}".into());
        assert!(text.to_sql(&Type::TEXT, &mut out).is_ok());
        assert!(text.to_sql(&Type::JSONB, &mut out).is_err());

        let native = StoredJson::Native(json!({"a": 1}));
        assert!(native.to_sql(&Type::JSONB, &mut out).is_ok());
        assert!(native.to_sql(&Type::TEXT, &mut out).is_err());

        assert!(<StoredJson as ToSql>::accepts(&Type::JSONB));
        assert!(!<StoredJson as ToSql>::accepts(&Type::INT4));
    }
}
