pub mod referrer_credit_worker;

pub use referrer_credit_worker::ReferrerCreditWorker;
