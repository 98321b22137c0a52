use tantivy::schema::{Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "text_with_stopwords";

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("chunk_id", STRING | STORED);
    schema_builder.add_text_field("doc_id", STRING | STORED);
    schema_builder.add_text_field("chunk_type", STRING | STORED);
    let text_field_indexing =
        TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
    schema_builder.add_text_field("text", text_options);
    schema_builder.add_u64_field("page", NumericOptions::default().set_indexed().set_stored());
    schema_builder.add_u64_field("position", NumericOptions::default().set_stored());
    schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
    let stop_words = [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of",
        "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them",
        "their", "there", "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom",
        "whose", "can", "could", "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have",
        "had", "having",
    ];
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop_words.into_iter().map(str::to_string)))
        .build();
    index.tokenizers().register(TOKENIZER, tokenizer);
}

/// Resolved handles for every field in [`build_schema`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkFields {
    pub chunk_id: Field,
    pub doc_id: Field,
    pub chunk_type: Field,
    pub text: Field,
    pub page: Field,
    pub position: Field,
}

impl ChunkFields {
    pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            chunk_id: schema.get_field("chunk_id")?,
            doc_id: schema.get_field("doc_id")?,
            chunk_type: schema.get_field("chunk_type")?,
            text: schema.get_field("text")?,
            page: schema.get_field("page")?,
            position: schema.get_field("position")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::tokenizer::TokenStream;

    #[test]
    fn tokenizer_lowercases_and_drops_stop_words() {
        let index = Index::create_in_ram(build_schema());
        register_tokenizer(&index);
        let mut analyzer = index.tokenizers().get(TOKENIZER).expect("registered");
        let mut stream = analyzer.token_stream("The Total of the Invoice");
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        assert_eq!(tokens, vec!["total", "invoice"]);
    }
}
