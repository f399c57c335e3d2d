use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::guard::normalize;

pub const DEFAULT_POLICY_THRESHOLD: f32 = 0.82;

/// Separator used to join a rule's keywords into the single text that
/// represents the rule in embedding space.
pub const KEYWORD_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyId {
    Membership,
    Luxe,
    GiftVouchers,
    CreditNotes,
    Refunds,
}

impl PolicyId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Membership => "membership",
            Self::Luxe => "luxe",
            Self::GiftVouchers => "gift-vouchers",
            Self::CreditNotes => "credit-notes",
            Self::Refunds => "refunds",
        }
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: PolicyId,
    pub strict_answer: String,
    pub keywords: Vec<String>,
    pub threshold: f32,
}

impl PolicyRule {
    pub fn new(id: PolicyId, strict_answer: &str, keywords: &[&str]) -> Self {
        Self {
            id,
            strict_answer: strict_answer.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            threshold: DEFAULT_POLICY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn embedding_text(&self) -> String {
        self.keywords.join(KEYWORD_SEPARATOR)
    }
}

/// Ordered, validated set of policy rules.
///
/// Iteration order is significant: the keyword stage and the embedding
/// tie-break both resolve to the first listed rule.
#[derive(Debug, Clone)]
pub struct PolicySet {
    rules: Vec<PolicyRule>,
    fallback: usize,
}

impl PolicySet {
    /// Validates `rules` and stores their keywords in the same normalized
    /// form the keyword stage compares against.
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self> {
        let rules: Vec<PolicyRule> = rules
            .into_iter()
            .map(|mut rule| {
                rule.keywords = rule
                    .keywords
                    .iter()
                    .map(|k| normalize(k).trim().to_string())
                    .collect();
                rule
            })
            .collect();

        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id) {
                return Err(Error::Config(format!("duplicate policy id '{}'", rule.id)));
            }
            if !(rule.threshold > 0.0 && rule.threshold <= 1.0) {
                return Err(Error::Config(format!(
                    "policy '{}' threshold {} is outside (0, 1]",
                    rule.id, rule.threshold
                )));
            }
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(Error::Config(format!("policy '{}' has no keywords", rule.id)));
            }
        }

        let fallback = rules
            .iter()
            .position(|r| r.id == PolicyId::Membership)
            .ok_or_else(|| Error::Config("the 'membership' policy is required".to_string()))?;

        Ok(Self { rules, fallback })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn get(&self, id: PolicyId) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// The rule returned when the regex gate opens but no keyword matches.
    pub fn fallback(&self) -> &PolicyRule {
        &self.rules[self.fallback]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub fn default_policies() -> PolicySet {
    let rules = vec![
        PolicyRule::new(
            PolicyId::Membership,
            "Memberships run for a minimum term of 12 months. After the minimum term you can \
             cancel at any time by giving one full month's notice in writing to \
             members@ourstore.example. Membership fees already paid are non-refundable and \
             changes to your plan take effect from your next billing date.",
            &[
                "how can i cancel",
                "cancel my membership",
                "cancel membership",
                "terminate my membership",
                "end my membership",
                "stop my membership",
                "change my membership",
                "modify my membership",
                "membership fee",
            ],
        ),
        PolicyRule::new(
            PolicyId::Luxe,
            "Luxe is billed annually in advance. A Luxe plan can be downgraded or closed only \
             at renewal, and the annual Luxe fee is not refunded for partial years.",
            &[
                "luxe membership",
                "luxe plan",
                "luxe subscription",
                "cancel luxe",
                "downgrade luxe",
            ],
        ),
        PolicyRule::new(
            PolicyId::GiftVouchers,
            "Gift vouchers are valid for 24 months from the date of purchase. They cannot be \
             exchanged for cash, refunded, resold or replaced if lost, and any unused balance \
             stays on the voucher until it expires.",
            &[
                "gift voucher",
                "gift card",
                "sell my voucher",
                "transfer my voucher",
                "voucher for cash",
                "voucher expiry",
            ],
        ),
        PolicyRule::new(
            PolicyId::CreditNotes,
            "Credit notes are issued in place of refunds for returns without a receipt. They are \
             valid for 12 months, can be used in any store and cannot be converted to cash.",
            &[
                "credit note",
                "store credit",
                "cash out my credit",
                "credit note expiry",
            ],
        ),
        PolicyRule::new(
            PolicyId::Refunds,
            "Refunds are available within 30 days of purchase on presentation of the original \
             receipt and are returned to the original payment method within 10 working days.",
            &[
                "refund policy",
                "get a refund",
                "request a refund",
                "money back",
            ],
        ),
    ];

    // Fixed at build time; membership is listed first.
    PolicySet { rules, fallback: 0 }
}
