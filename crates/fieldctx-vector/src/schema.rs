use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("chunk_type", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, true),
        Field::new("position", DataType::UInt32, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}
