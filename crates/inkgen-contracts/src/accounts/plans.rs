use super::account::Plan;

pub const CREDIT_RESET_NOTICE: &str = "Credits reset at 00:00 Europe/London time.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOffer {
    pub plan: Plan,
    pub title: &'static str,
    pub monthly_price_usd: u32,
    pub features: &'static [&'static str],
    pub popular: bool,
}

pub const PLAN_OFFERS: &[PlanOffer] = &[
    PlanOffer {
        plan: Plan::Starter,
        title: "Starter",
        monthly_price_usd: 10,
        features: &[
            "50 generations/month",
            "Standard quality",
            "Community support",
        ],
        popular: false,
    },
    PlanOffer {
        plan: Plan::Pro,
        title: "Pro",
        monthly_price_usd: 25,
        features: &[
            "200 generations/month",
            "Highest quality",
            "Priority support",
            "Early access to new styles",
        ],
        popular: true,
    },
];

impl PlanOffer {
    pub fn headline(&self) -> String {
        let marker = if self.popular { " (popular)" } else { "" };
        format!("{} ${}/mo{}", self.title, self.monthly_price_usd, marker)
    }
}
