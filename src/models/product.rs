use serde::{Deserialize, Serialize};

/// Catalog entry as reported by the store authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Price in millionths of the currency unit (1.99 USD = 1_990_000)
    pub price_micros: i64,
    pub currency_code: String,
    #[serde(default)]
    pub display_price: String,
    pub kind: ProductKind,
    #[serde(default)]
    pub subscription_period: Option<SubscriptionPeriod>,
    #[serde(default)]
    pub subscription_group_id: Option<String>,
}

/// Store-level product kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    AutoRenewable,
    NonConsumable,
    NonRenewable,
    Consumable,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionPeriod {
    pub unit: PeriodUnit,
    pub value: u32,
}

impl SubscriptionPeriod {
    pub fn new(unit: PeriodUnit, value: u32) -> Self {
        Self { unit, value }
    }
}

/// Business classification of a product, derived from its kind and period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Monthly,
    Quarterly,
    Yearly,
    OtherSubscription,
    Lifetime,
    NonRenewable,
    Consumable,
    Unknown,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::OtherSubscription => "other_subscription",
            Self::Lifetime => "lifetime",
            Self::NonRenewable => "non_renewable",
            Self::Consumable => "consumable",
            Self::Unknown => "unknown",
        }
    }

    /// Auto-renewing subscription types
    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            Self::Monthly | Self::Quarterly | Self::Yearly | Self::OtherSubscription
        )
    }

    /// Whether a transaction of this type can be recovered by a restore
    pub fn is_restorable(&self) -> bool {
        self.is_subscription() || matches!(self, Self::Lifetime | Self::NonRenewable)
    }
}

impl Product {
    pub fn product_type(&self) -> ProductType {
        match self.kind {
            ProductKind::AutoRenewable => match self.subscription_period {
                Some(SubscriptionPeriod {
                    unit: PeriodUnit::Month,
                    value: 1,
                }) => ProductType::Monthly,
                Some(SubscriptionPeriod {
                    unit: PeriodUnit::Month,
                    value: 3,
                }) => ProductType::Quarterly,
                Some(SubscriptionPeriod {
                    unit: PeriodUnit::Year,
                    value: 1,
                }) => ProductType::Yearly,
                _ => ProductType::OtherSubscription,
            },
            ProductKind::NonConsumable => ProductType::Lifetime,
            ProductKind::NonRenewable => ProductType::NonRenewable,
            ProductKind::Consumable => ProductType::Consumable,
            ProductKind::Unknown => ProductType::Unknown,
        }
    }
}
