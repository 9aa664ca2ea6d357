// Text preparation for the model
//
// - html: tag-preserving tokenizer and block segmentation for rich-text fields
// - chunk: sentence splitting, length-bounded chunking and translatability checks

pub mod chunk;
pub mod html;

pub use chunk::{chunk_text, should_translate, split_outer_whitespace, split_sentences};
pub use html::{looks_like_html, split_blocks, tag_signature, tokenize, visible_text, Block, BlockKind, Token};
