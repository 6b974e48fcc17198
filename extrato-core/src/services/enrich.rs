//! Attach category/rule/icon suggestions to review items

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::classification::FALLBACK_ICON;
use crate::domain::{Classification, ReviewItem};
use crate::ports::Classifier;

/// Outcome of one enrichment pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Enrichment {
    /// Unique descriptions sent to the classifier
    pub requested: usize,
    /// Descriptions that received a valid suggestion from the classifier
    pub classified: usize,
    /// The classifier was missing or failed, so every item got the fallback
    pub fallback: bool,
}

pub struct ClassificationEnricher {
    classifier: Option<Arc<dyn Classifier>>,
}

impl ClassificationEnricher {
    pub fn new(classifier: Option<Arc<dyn Classifier>>) -> Self {
        Self { classifier }
    }

    /// Enricher that always suggests the fallback
    pub fn offline() -> Self {
        Self { classifier: None }
    }

    pub fn classifier_name(&self) -> Option<&str> {
        self.classifier.as_ref().map(|c| c.name())
    }

    /// Give every item a suggestion. Never fails: classifier errors, omitted
    /// descriptions and suggestions outside the taxonomy all end in the fallback.
    pub async fn enrich(&self, items: &mut [ReviewItem]) -> Enrichment {
        let descriptions = unique_descriptions(items);
        if descriptions.is_empty() {
            return Enrichment::default();
        }

        let mut outcome = Enrichment {
            requested: descriptions.len(),
            ..Enrichment::default()
        };

        let suggestions = match &self.classifier {
            None => {
                outcome.fallback = true;
                HashMap::new()
            }
            Some(classifier) => match classifier.classify(&descriptions).await {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(
                        classifier = classifier.name(),
                        error = %e,
                        "classification failed, using fallback suggestions"
                    );
                    outcome.fallback = true;
                    HashMap::new()
                }
            },
        };

        let accepted: HashMap<&str, Classification> = suggestions
            .iter()
            .filter_map(|(description, suggestion)| {
                accept(suggestion).map(|s| (description.as_str(), s))
            })
            .collect();
        outcome.classified = descriptions
            .iter()
            .filter(|d| accepted.contains_key(d.as_str()))
            .count();

        for item in items.iter_mut() {
            let suggestion = accepted
                .get(item.description())
                .cloned()
                .unwrap_or_else(Classification::fallback);
            item.apply_suggestion(suggestion);
        }

        outcome
    }
}

/// Descriptions in first-seen order, without repeats
fn unique_descriptions(items: &[ReviewItem]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|i| i.description())
        .filter(|d| seen.insert(*d))
        .map(str::to_string)
        .collect()
}

fn accept(suggestion: &Classification) -> Option<Classification> {
    if !suggestion.is_valid() {
        return None;
    }
    let mut accepted = suggestion.clone();
    if accepted.icon.trim().is_empty() {
        accepted.icon = FALLBACK_ICON.to_string();
    }
    Some(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::{Error, Result};
    use crate::domain::{BudgetRule, CanonicalTransaction, TransactionType};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct Recording {
        calls: Mutex<Vec<Vec<String>>>,
        reply: Result<HashMap<String, Classification>>,
    }

    #[async_trait]
    impl Classifier for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn classify(&self, descriptions: &[String]) -> Result<HashMap<String, Classification>> {
            self.calls.lock().unwrap().push(descriptions.to_vec());
            match &self.reply {
                Ok(map) => Ok(map.clone()),
                Err(_) => Err(Error::classification("service unavailable")),
            }
        }
    }

    fn item(description: &str) -> ReviewItem {
        ReviewItem::new(
            CanonicalTransaction {
                date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                description: description.to_string(),
                amount: Decimal::new(1000, 2),
                transaction_type: TransactionType::Expense,
                external_id: Uuid::new_v4().to_string(),
                account_id: Uuid::new_v4(),
                credit_card_id: None,
                category_id: None,
                category: None,
                is_fixed: false,
                classification_rule: BudgetRule::Wants,
            },
            false,
        )
    }

    fn suggestion(category: &str, rule: BudgetRule, icon: &str) -> Classification {
        Classification {
            category: category.to_string(),
            rule,
            icon: icon.to_string(),
        }
    }

    #[tokio::test]
    async fn test_unique_descriptions_in_one_call() {
        let mut reply = HashMap::new();
        reply.insert("Uber".to_string(), suggestion("Transporte", BudgetRule::Necessities, "🚗"));
        let classifier = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
            reply: Ok(reply),
        });
        let enricher = ClassificationEnricher::new(Some(classifier.clone()));

        let mut items = vec![item("Uber"), item("Padaria"), item("Uber")];
        let outcome = enricher.enrich(&mut items).await;

        let calls = classifier.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["Uber".to_string(), "Padaria".to_string()]);
        assert_eq!(outcome.requested, 2);
        assert_eq!(outcome.classified, 1);
        assert!(!outcome.fallback);

        assert_eq!(items[0].suggested_category, "Transporte");
        assert_eq!(items[2].suggested_rule, BudgetRule::Necessities);
        // Omitted by the classifier
        assert_eq!(items[1].suggested_category, "Outros");
    }

    #[tokio::test]
    async fn test_failure_falls_back_for_every_item() {
        let classifier = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
            reply: Err(Error::classification("down")),
        });
        let enricher = ClassificationEnricher::new(Some(classifier));
        let mut items = vec![item("Uber"), item("Padaria")];
        let outcome = enricher.enrich(&mut items).await;

        assert!(outcome.fallback);
        for i in &items {
            assert_eq!(i.suggested_category, "Outros");
            assert_eq!(i.suggested_rule, BudgetRule::Wants);
            assert_eq!(i.suggested_icon, FALLBACK_ICON);
        }
    }

    #[tokio::test]
    async fn test_invalid_suggestions_are_replaced() {
        let mut reply = HashMap::new();
        reply.insert("Uber".to_string(), suggestion("Crypto", BudgetRule::Wants, "🚀"));
        reply.insert("Netflix".to_string(), suggestion("Assinaturas", BudgetRule::Wants, " "));
        let enricher = ClassificationEnricher::new(Some(Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
            reply: Ok(reply),
        })));
        let mut items = vec![item("Uber"), item("Netflix")];
        enricher.enrich(&mut items).await;

        assert_eq!(items[0].suggested_category, "Outros");
        assert_eq!(items[1].suggested_category, "Assinaturas");
        assert_eq!(items[1].suggested_icon, FALLBACK_ICON);
    }

    #[tokio::test]
    async fn test_empty_items_skip_the_call() {
        let classifier = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
            reply: Ok(HashMap::new()),
        });
        let enricher = ClassificationEnricher::new(Some(classifier.clone()));
        let outcome = enricher.enrich(&mut []).await;
        assert_eq!(outcome, Enrichment::default());
        assert!(classifier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_uses_fallback() {
        let mut items = vec![item("Anything")];
        let outcome = ClassificationEnricher::offline().enrich(&mut items).await;
        assert!(outcome.fallback);
        assert_eq!(items[0].suggested_category, "Outros");
    }
}
