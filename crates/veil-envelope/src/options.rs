//! Injection of key material into a per-call option list.

/// A new option list with `injected` first, followed by the caller's
/// options in their original order.
///
/// `None` stands for a caller that passed no list at all and is treated
/// like an empty one. The caller's slice is never modified.
pub fn prepend_option<O: Clone>(injected: O, options: Option<&[O]>) -> Vec<O> {
    let options = options.unwrap_or_default();
    let mut assembled = Vec::with_capacity(options.len() + 1);
    assembled.push(injected);
    assembled.extend_from_slice(options);
    assembled
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use veil_store::{SourceOption, TargetOption};
    use veil_types::KeySecret;

    use super::*;

    #[test]
    fn empty_and_absent_lists() {
        assert_eq!(prepend_option(1, None), vec![1]);
        assert_eq!(prepend_option(1, Some(&[][..])), vec![1]);
    }

    #[test]
    fn keeps_caller_options() {
        let secret = KeySecret::from_bytes([3; 32]);
        let caller = [TargetOption::DoesNotExist, TargetOption::UserProject("p".into())];
        let assembled = prepend_option(TargetOption::encryption_key(&secret), Some(&caller[..]));
        assert_eq!(assembled.len(), 3);
        assert_eq!(assembled[0], TargetOption::encryption_key(&secret));
        assert_eq!(&assembled[1..], &caller[..]);
    }

    #[test]
    fn works_for_source_options() {
        let secret = KeySecret::from_bytes([4; 32]);
        let assembled = prepend_option(
            SourceOption::decryption_key(&secret),
            Some(&[SourceOption::GenerationMatch(5)][..]),
        );
        assert_eq!(assembled[1], SourceOption::GenerationMatch(5));
    }

    proptest! {
        #[test]
        fn prepend_is_non_destructive(original in prop::collection::vec(any::<i64>(), 0..32), injected: i64) {
            let assembled = prepend_option(injected, Some(original.as_slice()));
            prop_assert_eq!(assembled.len(), original.len() + 1);
            prop_assert_eq!(assembled[0], injected);
            prop_assert_eq!(&assembled[1..], &original[..]);
        }
    }
}
