//! 参数翻译的性质测试。

use blockgate_nbd::config::{ConfigTranslator, StoreArgParser};
use proptest::prelude::*;

fn translate(events: &[(String, String)]) -> Vec<String> {
    let mut translator = ConfigTranslator::new();
    for (name, value) in events {
        translator
            .configure(&StoreArgParser, name, value)
            .expect("known flags are accepted");
    }
    translator.finish()
}

fn flag_event() -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        ("blockSize|size|blockCacheSize", "[0-9]{1,6}[kmg]?"),
        ("readOnly|debug", "(true|false|TRUE|False)"),
    ]
}

proptest! {
    /// 前缀只是消歧手段，不改变翻译结果；目标恒在末尾。
    #[test]
    fn prefix_does_not_change_translation(
        events in proptest::collection::vec(flag_event(), 0..8),
        target in "mem:[a-z]{1,8}",
        target_at in 0usize..8,
    ) {
        let mut plain = events.clone();
        plain.insert(target_at.min(plain.len()), ("target".to_owned(), target.clone()));
        let prefixed: Vec<_> = plain
            .iter()
            .map(|(name, value)| (format!("bg_{name}"), value.clone()))
            .collect();

        let a = translate(&plain);
        let b = translate(&prefixed);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.first().map(String::as_str), Some("blockgate"));
        prop_assert_eq!(a.last(), Some(&target));
        let true_booleans = events
            .iter()
            .filter(|(_, value)| value.eq_ignore_ascii_case("true"))
            .count();
        let values = events
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "readOnly" | "debug"))
            .count();
        prop_assert_eq!(a.len(), 2 + true_booleans + values);
    }
}
