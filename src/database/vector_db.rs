use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, points_selector::PointsSelectorOneOf, value::Kind,
        with_payload_selector::SelectorOptions, Condition, CountPoints, CreateCollection,
        DeletePoints, Distance, Filter, ListValue, PointId, PointStruct, PointsSelector,
        SearchPoints, Struct, UpsertPoints, Value, VectorParams, VectorsConfig,
        WithPayloadSelector,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::qdrant_config::create_qdrant_client;

const UPSERT_BATCH: usize = 64;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
}

/// A vector with its JSON payload, ready for upsert.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Stable point id for chunk `chunk_index` of a paper, so re-ingesting a
/// paper overwrites its points.
pub fn point_id_for(paper_id: &str, chunk_index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}_{}", paper_id, chunk_index).as_bytes(),
    )
    .to_string()
}

pub(crate) fn json_to_qdrant(value: serde_json::Value) -> Value {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Kind::StringValue(s),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(Struct {
            fields: map.into_iter().map(|(k, v)| (k, json_to_qdrant(v))).collect(),
        }),
    };
    Value { kind: Some(kind) }
}

pub(crate) fn qdrant_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_to_json(v)))
                .collect(),
        ),
    }
}

pub(crate) fn field_filter(key: &str, value: &str) -> Filter {
    Filter::must([Condition::matches(key, value.to_string())])
}

#[derive(Clone)]
pub struct VectorDB {
    client: Arc<Qdrant>,
}

impl VectorDB {
    pub async fn new(url: &str) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url).await?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn create_collection(
        &self,
        name: &str,
        vector_size: u64,
    ) -> Result<(), VectorDBError> {
        let vectors_config = VectorParams {
            size: vector_size,
            distance: Distance::Cosine.into(),
            ..Default::default()
        };

        let vectors_config = VectorsConfig {
            config: Some(qdrant_client::qdrant::vectors_config::Config::Params(vectors_config)),
        };

        let create_collection = CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        match self.client.create_collection(create_collection).await {
            Ok(_) => {
                log::info!("Created collection {} ({} dims)", name, vector_size);
                Ok(())
            }
            Err(e) if e.to_string().to_lowercase().contains("already exists") => {
                log::info!("Collection {} already exists, skipping creation", name);
                Ok(())
            }
            Err(e) => Err(VectorDBError::Operation(e.to_string())),
        }
    }

    pub async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<usize, VectorDBError> {
        let total = points.len();
        let mut points = points.into_iter().peekable();

        while points.peek().is_some() {
            let batch: Vec<PointStruct> = points
                .by_ref()
                .take(UPSERT_BATCH)
                .map(|p| PointStruct {
                    id: Some(PointId {
                        point_id_options: Some(PointIdOptions::Uuid(p.id)),
                    }),
                    vectors: Some(p.vector.into()),
                    payload: p
                        .payload
                        .into_iter()
                        .map(|(k, v)| (k, json_to_qdrant(v)))
                        .collect(),
                })
                .collect();

            let upsert_points = UpsertPoints {
                collection_name: collection.to_string(),
                points: batch,
                wait: Some(true),
                ..Default::default()
            };

            self.client
                .upsert_points(upsert_points)
                .await
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        }

        Ok(total)
    }

    /// Nearest neighbours of `query_vector`, optionally restricted to points
    /// whose payload field `key` equals `value`.
    pub async fn search_vectors(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: u64,
        field: Option<(&str, &str)>,
    ) -> Result<Vec<ScoredVector>, VectorDBError> {
        let request = SearchPoints {
            collection_name: collection.to_string(),
            vector: query_vector,
            limit,
            filter: field.map(|(key, value)| field_filter(key, value)),
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let points = results
            .result
            .into_iter()
            .map(|point| {
                let id = match point.id.and_then(|id| id.point_id_options) {
                    Some(PointIdOptions::Uuid(uuid)) => uuid,
                    Some(PointIdOptions::Num(n)) => n.to_string(),
                    None => String::new(),
                };
                let payload = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, qdrant_to_json(v)))
                    .collect();
                ScoredVector {
                    id,
                    score: point.score,
                    payload,
                }
            })
            .collect();

        Ok(points)
    }

    pub async fn count_points(&self, collection: &str) -> Result<u64, VectorDBError> {
        let request = CountPoints {
            collection_name: collection.to_string(),
            exact: Some(true),
            ..Default::default()
        };

        let response = self
            .client
            .count(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    /// Delete every point whose payload field `key` equals `value`.
    pub async fn delete_by_field(
        &self,
        collection: &str,
        key: &str,
        value: &str,
    ) -> Result<(), VectorDBError> {
        let delete_points = DeletePoints {
            collection_name: collection.to_string(),
            wait: Some(true),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Filter(field_filter(key, value))),
            }),
            ..Default::default()
        };

        self.client
            .delete_points(delete_points)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(())
    }

    pub async fn delete_paper(&self, collection: &str, paper_id: &str) -> Result<(), VectorDBError> {
        self.delete_by_field(collection, "paper_id", paper_id).await
    }
}
