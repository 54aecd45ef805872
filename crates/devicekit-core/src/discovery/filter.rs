// ── Admission filter ──
//
// Pure evaluation of one discovered candidate against one provision
// watcher: allow-list first, then deny-list. Patterns are compiled once
// per watcher with `CompiledWatcher::compile` and reused for every
// candidate of a cycle.

use regex::Regex;

use crate::error::CoreError;
use crate::model::{DiscoveredDevice, ProvisionWatcher};

/// Outcome of evaluating a candidate against a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Admitted,
    /// An allow-list property is absent from every protocol bundle.
    MissingIdentifier { property: String },
    /// An exposed value failed the allow-list pattern.
    PatternMismatch {
        property: String,
        value: String,
        pattern: String,
    },
    /// An exposed value equals a deny-list literal.
    Blocked { property: String, value: String },
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// A watcher with its allow-list patterns compiled, both lists sorted by property.
#[derive(Debug)]
pub struct CompiledWatcher<'a> {
    watcher: &'a ProvisionWatcher,
    identifiers: Vec<(&'a str, Regex)>,
    blocking: Vec<(&'a str, &'a [String])>,
}

impl<'a> CompiledWatcher<'a> {
    /// Fails on the first identifier pattern that is not a valid regex.
    pub fn compile(watcher: &'a ProvisionWatcher) -> Result<Self, CoreError> {
        let mut identifiers = watcher
            .identifiers
            .iter()
            .map(|(property, pattern)| {
                Regex::new(pattern)
                    .map(|regex| (property.as_str(), regex))
                    .map_err(|e| CoreError::InvalidPattern {
                        watcher: watcher.name.clone(),
                        property: property.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        identifiers.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut blocking: Vec<_> = watcher
            .blocking_identifiers
            .iter()
            .map(|(property, forbidden)| (property.as_str(), forbidden.as_slice()))
            .collect();
        blocking.sort_unstable_by(|a, b| a.0.cmp(b.0));

        Ok(Self {
            watcher,
            identifiers,
            blocking,
        })
    }

    pub fn watcher(&self) -> &'a ProvisionWatcher {
        self.watcher
    }

    pub fn name(&self) -> &'a str {
        &self.watcher.name
    }
}

/// Run both stages. The deny-list is only consulted when the allow-list passes.
pub fn evaluate(candidate: &DiscoveredDevice, watcher: &CompiledWatcher<'_>) -> Verdict {
    match allow_list(candidate, watcher) {
        Verdict::Admitted => deny_list(candidate, watcher),
        rejected => rejected,
    }
}

/// Every identifier must be exposed by at least one protocol bundle, and
/// every exposed value must match the identifier's pattern.
pub fn allow_list(candidate: &DiscoveredDevice, watcher: &CompiledWatcher<'_>) -> Verdict {
    for (property, regex) in &watcher.identifiers {
        let mut exposed = false;
        for value in candidate.property_values(property) {
            exposed = true;
            if !regex.is_match(value) {
                return Verdict::PatternMismatch {
                    property: (*property).to_owned(),
                    value: value.to_owned(),
                    pattern: regex.as_str().to_owned(),
                };
            }
        }
        if !exposed {
            return Verdict::MissingIdentifier {
                property: (*property).to_owned(),
            };
        }
    }
    Verdict::Admitted
}

/// No exposed value may equal any forbidden literal. Comparison is exact.
pub fn deny_list(candidate: &DiscoveredDevice, watcher: &CompiledWatcher<'_>) -> Verdict {
    for (property, forbidden) in &watcher.blocking {
        if let Some(value) = candidate
            .property_values(property)
            .find(|value| forbidden.iter().any(|f| f.as_str() == *value))
        {
            return Verdict::Blocked {
                property: (*property).to_owned(),
                value: value.to_owned(),
            };
        }
    }
    Verdict::Admitted
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::AdminState;

    fn candidate(protocol: &str, props: &[(&str, &str)]) -> DiscoveredDevice {
        let bundle = props
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        DiscoveredDevice {
            name: "candidate".into(),
            protocols: HashMap::from([(protocol.to_owned(), bundle)]),
            description: String::new(),
            labels: Vec::new(),
        }
    }

    fn watcher(identifiers: &[(&str, &str)], blocking: &[(&str, &str)]) -> ProvisionWatcher {
        ProvisionWatcher {
            name: "watcher".into(),
            profile_name: "profile".into(),
            service_name: "service".into(),
            admin_state: AdminState::Unlocked,
            identifiers: identifiers
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            blocking_identifiers: blocking
                .iter()
                .map(|(k, v)| ((*k).to_owned(), vec![(*v).to_owned()]))
                .collect(),
        }
    }

    fn compile(watcher: &ProvisionWatcher) -> CompiledWatcher<'_> {
        CompiledWatcher::compile(watcher).unwrap()
    }

    #[test]
    fn mac_prefix_admits_matching_candidate() {
        let w1 = watcher(&[("mac", "^AA:.*")], &[]);
        let c1 = candidate("other", &[("mac", "AA:11:22:33:44:55")]);
        assert_eq!(evaluate(&c1, &compile(&w1)), Verdict::Admitted);
    }

    #[test]
    fn mac_prefix_rejects_non_matching_candidate() {
        let w1 = watcher(&[("mac", "^AA:.*")], &[]);
        let c2 = candidate("other", &[("mac", "BB:11:22:33:44:55")]);
        assert_eq!(
            evaluate(&c2, &compile(&w1)),
            Verdict::PatternMismatch {
                property: "mac".into(),
                value: "BB:11:22:33:44:55".into(),
                pattern: "^AA:.*".into(),
            }
        );
    }

    #[test]
    fn missing_identifier_rejects() {
        let w = watcher(&[("mac", "^AA:.*")], &[]);
        let c = candidate("other", &[("serial", "123")]);
        assert_eq!(
            evaluate(&c, &compile(&w)),
            Verdict::MissingIdentifier {
                property: "mac".into()
            }
        );
    }

    #[test]
    fn identifier_found_in_any_bundle() {
        let w = watcher(&[("mac", "^AA:")], &[]);
        let mut c = candidate("tcp", &[("host", "10.0.0.2")]);
        c.protocols.insert(
            "other".into(),
            HashMap::from([("mac".to_owned(), "AA:00".to_owned())]),
        );
        assert!(evaluate(&c, &compile(&w)).is_admitted());
    }

    #[test]
    fn every_exposed_value_must_match() {
        let w = watcher(&[("mac", "^AA:")], &[]);
        let mut c = candidate("a", &[("mac", "AA:00")]);
        c.protocols.insert(
            "b".into(),
            HashMap::from([("mac".to_owned(), "BB:00".to_owned())]),
        );
        assert!(matches!(
            evaluate(&c, &compile(&w)),
            Verdict::PatternMismatch { .. }
        ));
    }

    #[test]
    fn invalid_pattern_fails_to_compile() {
        let w = watcher(&[("mac", "^AA:"), ("serial", "([unclosed")], &[]);
        let err = CompiledWatcher::compile(&w).unwrap_err();
        match err {
            CoreError::InvalidPattern {
                watcher, property, ..
            } => {
                assert_eq!(watcher, "watcher");
                assert_eq!(property, "serial");
            }
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn compiled_watcher_is_reused_across_candidates() {
        let w = watcher(&[("mac", "^AA:")], &[("serial", "000000")]);
        let compiled = CompiledWatcher::compile(&w).unwrap();
        assert_eq!(compiled.name(), "watcher");

        let verdicts: Vec<_> = [
            candidate("other", &[("mac", "AA:01"), ("serial", "1")]),
            candidate("other", &[("mac", "BB:01")]),
            candidate("other", &[("mac", "AA:02"), ("serial", "000000")]),
        ]
        .iter()
        .map(|c| evaluate(c, &compiled))
        .collect();

        assert!(verdicts[0].is_admitted());
        assert!(matches!(verdicts[1], Verdict::PatternMismatch { .. }));
        assert!(matches!(verdicts[2], Verdict::Blocked { .. }));
    }

    #[test]
    fn blocking_identifier_rejects_exact_match() {
        let w2 = watcher(&[], &[("serial", "000000")]);
        let c3 = candidate("other", &[("serial", "000000")]);
        assert_eq!(
            evaluate(&c3, &compile(&w2)),
            Verdict::Blocked {
                property: "serial".into(),
                value: "000000".into(),
            }
        );
    }

    #[test]
    fn blocking_identifier_rejects_even_after_allow_list_passes() {
        let w = watcher(&[("serial", "^0+$")], &[("serial", "000000")]);
        let c = candidate("other", &[("serial", "000000")]);
        assert!(allow_list(&c, &compile(&w)).is_admitted());
        assert!(matches!(evaluate(&c, &compile(&w)), Verdict::Blocked { .. }));
    }

    #[test]
    fn blocking_comparison_is_case_sensitive() {
        let w = watcher(&[], &[("name", "Gateway")]);
        let near_miss = candidate("other", &[("name", "gateway")]);
        assert_eq!(evaluate(&near_miss, &compile(&w)), Verdict::Admitted);
    }

    #[test]
    fn absent_blocking_property_does_not_reject() {
        let w = watcher(&[], &[("serial", "000000")]);
        let c = candidate("other", &[("mac", "AA")]);
        assert_eq!(deny_list(&c, &compile(&w)), Verdict::Admitted);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let w = watcher(&[("mac", "^AA:.*")], &[("serial", "000000")]);
        let c = candidate("other", &[("mac", "AA:01"), ("serial", "123456")]);
        let compiled = compile(&w);
        let first = evaluate(&c, &compiled);
        for _ in 0..10 {
            assert_eq!(evaluate(&c, &compiled), first);
        }
        assert!(first.is_admitted());
    }
}
