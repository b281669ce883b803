mod account;
mod plans;

pub use account::{Account, GenerationRecord, Identity, Plan, FREE_DAILY_LIMIT};
pub use plans::{PlanOffer, CREDIT_RESET_NOTICE, PLAN_OFFERS};
