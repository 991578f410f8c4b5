//! Tokenizer vocabulary merging: extend a base vocabulary with the tokens
//! it is missing from an incoming one.

use crate::model::Tokenizer;

/// Merge `incoming`'s vocabulary into `base`, in place.
///
/// The result is the set union of both vocabularies: every token of
/// `incoming` absent from `base` is appended, in `incoming`'s id order,
/// so ids for a given input pair are deterministic. Existing id
/// assignments in `base` are never disturbed. Returns the number of
/// tokens added.
pub fn merge_vocabularies(base: &mut Tokenizer, incoming: &Tokenizer) -> usize {
    let missing: Vec<String> = incoming
        .tokens()
        .iter()
        .filter(|token| !base.contains(token))
        .cloned()
        .collect();

    base.add_tokens(&missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_extends_base() {
        let mut base = Tokenizer::from_tokens(["a", "b"]);
        let incoming = Tokenizer::from_tokens(["b", "c", "d"]);

        let added = merge_vocabularies(&mut base, &incoming);
        assert_eq!(added, 2);
        assert_eq!(base.vocab_size(), 4);

        // Base ids untouched, new ids appended in incoming order.
        assert_eq!(base.token_id("a"), Some(0));
        assert_eq!(base.token_id("b"), Some(1));
        assert_eq!(base.token_id("c"), Some(2));
        assert_eq!(base.token_id("d"), Some(3));
    }

    #[test]
    fn test_self_merge_is_idempotent() {
        let mut base = Tokenizer::from_tokens(["a", "b", "c"]);
        let copy = base.clone();

        assert_eq!(merge_vocabularies(&mut base, &copy), 0);
        assert_eq!(base.vocab_size(), 3);
    }

    #[test]
    fn test_empty_base_is_identity() {
        let mut base = Tokenizer::new();
        let incoming = Tokenizer::from_tokens(["x", "y"]);

        assert_eq!(merge_vocabularies(&mut base, &incoming), 2);
        assert_eq!(base.tokens(), incoming.tokens());
    }
}
