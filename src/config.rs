// config.rs
use bigdecimal::BigDecimal;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub app_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub payment_currency: String,
    pub platform_fee_percent: BigDecimal,
    pub payment_callback_url: String,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let app_url = std::env::var("APP_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8000);

        // Payment provider configuration (with defaults)
        let paystack_secret_key = std::env::var("PAYSTACK_SECRET_KEY")
            .unwrap_or_else(|_| "test_secret_key".to_string());
        let paystack_base_url = std::env::var("PAYSTACK_BASE_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());
        let payment_currency = std::env::var("PAYMENT_CURRENCY")
            .unwrap_or_else(|_| "NGN".to_string());
        let platform_fee_percent = std::env::var("PLATFORM_FEE_PERCENT")
            .ok()
            .and_then(|p| BigDecimal::from_str(&p).ok())
            .unwrap_or_else(|| BigDecimal::from(10));
        let payment_callback_url = std::env::var("PAYMENT_CALLBACK_URL")
            .unwrap_or_else(|_| format!("{}/api/payments/callback", app_url));

        Config {
            database_url,
            app_url,
            jwt_secret,
            port,
            paystack_secret_key,
            paystack_base_url,
            payment_currency,
            platform_fee_percent,
            payment_callback_url,
        }
    }
}
