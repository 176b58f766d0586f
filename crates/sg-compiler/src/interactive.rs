//! User ruleset + subscriptions, and the toggle patch workflow
//!
//! The user's own rules always win: if any user rule fires for an entry, its
//! aggregate is the decision and subscriptions are not consulted. Otherwise
//! the matches of every subscription are pooled and aggregated.
//!
//! A patch flips the decision for one entry. It is created, optionally edited
//! with [`InteractiveRuleset::modify_patch`], then applied or discarded. Only
//! one patch is pending at a time.

use std::rc::Rc;

use serde::Serialize;

use sg_core::psl::{is_ip_host, registrable_domain};
use sg_core::{Decision, EntryProps, RuleMatch, UrlParts};

use crate::error::PatchError;
use crate::ruleset::Ruleset;

/// A proposed edit of the user ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Whether the patch unblocks (true) or blocks (false) the entry.
    pub unblock: bool,
    pub props: EntryProps,
    pub rules_to_add: String,
    pub rules_to_remove: String,
}

#[derive(Debug, Clone)]
struct PendingPatch {
    patch: Patch,
    lines_to_remove: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct InteractiveRuleset {
    user: Ruleset,
    subscriptions: Vec<Rc<Ruleset>>,
    pending: Option<PendingPatch>,
}

impl InteractiveRuleset {
    pub fn new(user: Ruleset, subscriptions: Vec<Rc<Ruleset>>) -> Self {
        Self {
            user,
            subscriptions,
            pending: None,
        }
    }

    /// Final decision for one entry, `None` if no rule decides it.
    pub fn query(&self, props: &EntryProps) -> Option<Decision> {
        aggregate(&self.user.query(props)).or_else(|| self.subscription_decision(props))
    }

    /// Pooled decision of all subscriptions.
    pub fn subscription_decision(&self, props: &EntryProps) -> Option<Decision> {
        let pooled: Vec<RuleMatch> = self
            .subscriptions
            .iter()
            .flat_map(|subscription| subscription.query(props))
            .collect();
        aggregate(&pooled)
    }

    /// Propose the patch that toggles `props`, replacing any pending one.
    ///
    /// With `widen_to_domain` the suggested rule covers the whole
    /// registrable domain instead of the exact host.
    pub fn create_patch(&mut self, props: &EntryProps, widen_to_domain: bool) -> Patch {
        if self.pending.take().is_some() {
            log::debug!("discarding unapplied patch");
        }

        let user_matches = self.user.query(props);
        let subscriptions_block = self.subscription_decision(props) == Some(Decision::Block);
        let has_plain_block = user_matches.iter().any(RuleMatch::is_plain_block);

        let (unblock, lines_to_remove, needs_rule) = if user_matches.iter().any(|m| !m.is_plain_block()) {
            let lines = user_matches
                .iter()
                .filter(|m| !m.is_plain_block())
                .map(|m| m.line_number)
                .collect();
            (false, lines, !has_plain_block && !subscriptions_block)
        } else if has_plain_block {
            let lines = user_matches.iter().map(|m| m.line_number).collect();
            (true, lines, subscriptions_block)
        } else {
            // nothing from the user: flip whatever the subscriptions decide
            (subscriptions_block, Vec::new(), true)
        };

        let rules_to_add = if needs_rule {
            suggested_rule(props.url(), unblock, widen_to_domain).unwrap_or_default()
        } else {
            String::new()
        };
        let rules_to_remove = lines_to_remove
            .iter()
            .filter_map(|&line| self.user.get(line))
            .collect::<Vec<_>>()
            .join("\n");

        let patch = Patch {
            unblock,
            props: props.clone(),
            rules_to_add,
            rules_to_remove,
        };
        log::debug!(
            "created {} patch for {}: -{:?} +{:?}",
            if unblock { "unblock" } else { "block" },
            props.url(),
            lines_to_remove,
            patch.rules_to_add
        );
        self.pending = Some(PendingPatch {
            patch: patch.clone(),
            lines_to_remove,
        });
        patch
    }

    /// Replace the pending patch's added rules.
    ///
    /// Returns `Ok(None)` and leaves the patch untouched if the new rules
    /// would not produce the patch's direction.
    pub fn modify_patch(&mut self, rules_to_add: &str) -> Result<Option<Patch>, PatchError> {
        let pending = self.pending.as_ref().ok_or(PatchError::NoPatch)?;
        let props = &pending.patch.props;

        let candidate = Ruleset::new(rules_to_add);
        let mut matches: Vec<RuleMatch> = self
            .user
            .query(props)
            .into_iter()
            .filter(|m| !pending.lines_to_remove.contains(&m.line_number))
            .collect();
        matches.extend(candidate.query(props));

        let decision = aggregate(&matches).or_else(|| self.subscription_decision(props));
        let blocked = decision == Some(Decision::Block);
        if blocked == pending.patch.unblock {
            log::debug!("rejected patch edit {:?}: decision would be {:?}", rules_to_add, decision);
            return Ok(None);
        }

        let Some(pending) = self.pending.as_mut() else {
            return Err(PatchError::NoPatch);
        };
        pending.patch.rules_to_add = rules_to_add.to_string();
        Ok(Some(pending.patch.clone()))
    }

    /// Remove the patch's lines from the user ruleset and append its additions.
    pub fn apply_patch(&mut self) -> Result<(), PatchError> {
        let pending = self.pending.take().ok_or(PatchError::NoPatch)?;
        for &line in &pending.lines_to_remove {
            self.user.delete(line);
        }
        self.user.extend(&pending.patch.rules_to_add);
        log::debug!("applied patch for {}", pending.patch.props.url());
        Ok(())
    }

    /// Discard the pending patch, if any.
    pub fn delete_patch(&mut self) {
        self.pending = None;
    }

    pub fn patch(&self) -> Option<&Patch> {
        self.pending.as_ref().map(|pending| &pending.patch)
    }

    pub fn user(&self) -> &Ruleset {
        &self.user
    }

    pub fn subscriptions(&self) -> &[Rc<Ruleset>] {
        &self.subscriptions
    }
}

fn aggregate(matches: &[RuleMatch]) -> Option<Decision> {
    Decision::aggregate(matches.iter().map(|m| m.specifier))
}

/// `*://HOST/*`, `@`-prefixed for unblock. `None` for URLs without a host.
fn suggested_rule(url: &str, unblock: bool, widen_to_domain: bool) -> Option<String> {
    let host = UrlParts::parse(url)?.host;
    if host.is_empty() {
        return None;
    }
    let host = if widen_to_domain && !is_ip_host(&host) {
        format!("*.{}", registrable_domain(&host))
    } else {
        host
    };
    let prefix = if unblock { "@" } else { "" };
    Some(format!("{prefix}*://{host}/*"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(user: &str, subscriptions: &[&str]) -> InteractiveRuleset {
        InteractiveRuleset::new(
            Ruleset::new(user),
            subscriptions.iter().map(|text| Rc::new(Ruleset::new(text))).collect(),
        )
    }

    fn props(url: &str) -> EntryProps {
        EntryProps::new(url)
    }

    #[test]
    fn test_unblock_subscription_block() {
        let mut engine = engine("", &["*://news.example/*"]);
        let entry = props("https://news.example/story");
        assert_eq!(engine.query(&entry), Some(Decision::Block));

        let patch = engine.create_patch(&entry, false);
        assert!(patch.unblock);
        assert_eq!(patch.rules_to_add, "@*://news.example/*");
        assert_eq!(patch.rules_to_remove, "");

        engine.apply_patch().unwrap();
        assert_eq!(engine.query(&entry), Some(Decision::Unblock));
        assert_eq!(engine.user().to_string(), "@*://news.example/*");
        assert!(engine.patch().is_none());
    }

    #[test]
    fn test_user_precedence() {
        let engine = engine("*://example.com/*", &["@*://example.com/*", "@3*://*.com/*"]);
        assert_eq!(engine.query(&props("https://example.com/")), Some(Decision::Block));
        // pooled subscriptions: highest outcome wins
        assert_eq!(engine.query(&props("https://other.com/")), Some(Decision::Highlight(3)));
        assert_eq!(engine.query(&props("https://other.org/")), None);
    }

    #[test]
    fn test_unblock_own_block() {
        let mut engine = engine("# mine\n*://example.com/*", &[]);
        let entry = props("https://example.com/page");
        let patch = engine.create_patch(&entry, false);
        assert!(patch.unblock);
        assert_eq!(patch.rules_to_remove, "*://example.com/*");
        assert_eq!(patch.rules_to_add, "");

        engine.apply_patch().unwrap();
        assert_eq!(engine.query(&entry), None);
        assert_eq!(engine.user().to_string(), "# mine");
    }

    #[test]
    fn test_unblock_own_block_over_subscription() {
        let mut engine = engine("*://example.com/*", &["*://*.example.com/*"]);
        let entry = props("https://example.com/");
        let patch = engine.create_patch(&entry, false);
        assert!(patch.unblock);
        assert_eq!(patch.rules_to_remove, "*://example.com/*");
        assert_eq!(patch.rules_to_add, "@*://example.com/*");

        engine.apply_patch().unwrap();
        assert_eq!(engine.query(&entry), Some(Decision::Unblock));
    }

    #[test]
    fn test_block_own_unblock() {
        let mut engine = engine("@*://example.com/*\n@2*://*.example.com/*", &[]);
        let entry = props("https://example.com/");
        assert_eq!(engine.query(&entry), Some(Decision::Highlight(2)));

        let patch = engine.create_patch(&entry, false);
        assert!(!patch.unblock);
        assert_eq!(patch.rules_to_remove, "@*://example.com/*\n@2*://*.example.com/*");
        assert_eq!(patch.rules_to_add, "*://example.com/*");

        engine.apply_patch().unwrap();
        assert_eq!(engine.query(&entry), Some(Decision::Block));
        assert_eq!(
            engine.user().query(&entry),
            vec![RuleMatch { line_number: 3, specifier: None }]
        );
    }

    #[test]
    fn test_block_keeps_existing_plain_block() {
        let mut engine = engine("*://*.example.com/*\n@1*://example.com/*", &[]);
        let patch = engine.create_patch(&props("https://example.com/"), false);
        assert!(!patch.unblock);
        assert_eq!(patch.rules_to_remove, "@1*://example.com/*");
        assert_eq!(patch.rules_to_add, "");
    }

    #[test]
    fn test_block_subscription_unblock() {
        let mut engine = engine("", &["@*://example.org/*"]);
        let entry = props("https://example.org/");
        let patch = engine.create_patch(&entry, false);
        assert!(!patch.unblock);
        assert_eq!(patch.rules_to_add, "*://example.org/*");
        engine.apply_patch().unwrap();
        assert_eq!(engine.query(&entry), Some(Decision::Block));
    }

    #[test]
    fn test_block_undecided() {
        let mut engine = engine("", &[]);
        let patch = engine.create_patch(&props("http://www.example.co.uk/a?b"), true);
        assert!(!patch.unblock);
        assert_eq!(patch.rules_to_add, "*://*.example.co.uk/*");

        let patch = engine.create_patch(&props("http://192.168.1.1/admin"), true);
        assert_eq!(patch.rules_to_add, "*://192.168.1.1/*");
    }

    #[test]
    fn test_modify_patch() {
        let mut engine = engine("", &["*://news.example/*"]);
        let entry = props("https://news.example/");
        engine.create_patch(&entry, false);

        // would still block
        assert_eq!(engine.modify_patch("*://news.example/*"), Ok(None));
        assert_eq!(engine.modify_patch("# nothing"), Ok(None));
        assert_eq!(engine.patch().map(|p| p.rules_to_add.as_str()), Some("@*://news.example/*"));

        let modified = engine.modify_patch("@1*://*.example/*").unwrap().unwrap();
        assert_eq!(modified.rules_to_add, "@1*://*.example/*");
        assert!(modified.unblock);

        engine.apply_patch().unwrap();
        assert_eq!(engine.query(&entry), Some(Decision::Highlight(1)));
    }

    #[test]
    fn test_modify_block_patch() {
        let mut engine = engine("@*://example.com/*", &[]);
        let entry = props("https://example.com/");
        engine.create_patch(&entry, false);
        assert_eq!(engine.modify_patch("@*://*.com/*"), Ok(None));
        assert!(engine.modify_patch("/example/").unwrap().is_some());
        engine.apply_patch().unwrap();
        assert_eq!(engine.query(&entry), Some(Decision::Block));
    }

    #[test]
    fn test_patch_lifecycle() {
        let mut engine = engine("", &[]);
        assert_eq!(engine.apply_patch(), Err(PatchError::NoPatch));
        assert_eq!(engine.modify_patch("*://a.example/*"), Err(PatchError::NoPatch));

        engine.create_patch(&props("https://a.example/"), false);
        let second = engine.create_patch(&props("https://b.example/"), false);
        assert_eq!(engine.patch(), Some(&second));

        engine.delete_patch();
        assert!(engine.patch().is_none());
        assert_eq!(engine.apply_patch(), Err(PatchError::NoPatch));
        assert_eq!(engine.user().line_count(), 0);
    }

    #[test]
    fn test_patch_serializes_camel_case() {
        let mut engine = engine("", &[]);
        let patch = engine.create_patch(&props("https://a.example/").with("title", "A"), false);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["rulesToAdd"], "*://a.example/*");
        assert_eq!(json["rulesToRemove"], "");
        assert_eq!(json["props"]["title"], "A");
        assert_eq!(json["unblock"], false);
    }
}
