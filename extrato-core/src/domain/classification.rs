//! Budget rule taxonomy and classification suggestions
//!
//! Categories are a closed list grouped by the 50/30/20 budgeting rule plus an
//! income bucket. Suggestions outside this list are never accepted.

use serde::{Deserialize, Serialize};

/// Budget bucket a category belongs to. Serialized as its percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum BudgetRule {
    Income,
    Goals,
    Wants,
    Necessities,
}

impl BudgetRule {
    pub const ALL: [BudgetRule; 4] = [
        BudgetRule::Necessities,
        BudgetRule::Wants,
        BudgetRule::Goals,
        BudgetRule::Income,
    ];

    pub fn value(&self) -> i64 {
        match self {
            BudgetRule::Income => 0,
            BudgetRule::Goals => 20,
            BudgetRule::Wants => 30,
            BudgetRule::Necessities => 50,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BudgetRule::Income => "Income",
            BudgetRule::Goals => "Goals",
            BudgetRule::Wants => "Wants",
            BudgetRule::Necessities => "Necessities",
        }
    }

    /// Category names allowed under this rule
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            BudgetRule::Necessities => &[
                "Moradia",
                "Alimentação",
                "Mercado",
                "Transporte",
                "Saúde",
                "Educação",
                "Contas",
                "Impostos",
            ],
            BudgetRule::Wants => &[
                "Restaurantes",
                "Lazer",
                "Compras",
                "Assinaturas",
                "Viagens",
                "Beleza",
                "Presentes",
                "Outros",
            ],
            BudgetRule::Goals => &[
                "Investimentos",
                "Reserva de Emergência",
                "Dívidas",
                "Previdência",
            ],
            BudgetRule::Income => &[
                "Salário",
                "Freelance",
                "Rendimentos",
                "Reembolso",
                "Outras Receitas",
            ],
        }
    }

    pub fn allows(&self, category: &str) -> bool {
        self.categories().iter().any(|c| *c == category)
    }
}

impl TryFrom<i64> for BudgetRule {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BudgetRule::Income),
            20 => Ok(BudgetRule::Goals),
            30 => Ok(BudgetRule::Wants),
            50 => Ok(BudgetRule::Necessities),
            other => Err(format!("invalid budget rule: {}", other)),
        }
    }
}

impl From<BudgetRule> for i64 {
    fn from(rule: BudgetRule) -> Self {
        rule.value()
    }
}

/// Category used when nothing better is known
pub const FALLBACK_CATEGORY: &str = "Outros";

/// Generic tag glyph
pub const FALLBACK_ICON: &str = "🏷️";

/// A category/rule/icon suggestion for one description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub rule: BudgetRule,
    pub icon: String,
}

impl Classification {
    /// The guaranteed suggestion: "Outros", Wants (30), tag glyph
    pub fn fallback() -> Self {
        Self {
            category: FALLBACK_CATEGORY.to_string(),
            rule: BudgetRule::Wants,
            icon: FALLBACK_ICON.to_string(),
        }
    }

    /// Whether the category belongs to the taxonomy under the given rule
    pub fn is_valid(&self) -> bool {
        self.rule.allows(&self.category)
    }
}

/// The taxonomy as (rule, categories) pairs, in the order sent to classifiers
pub fn taxonomy() -> Vec<(BudgetRule, &'static [&'static str])> {
    BudgetRule::ALL.iter().map(|r| (*r, r.categories())).collect()
}
