//! Detection of anti-bot interstitials served instead of the product page.

const CHALLENGE_SIGNATURES: &[&str] = &[
    "just a moment",
    "checking your browser",
    "please wait while we verify",
    "attention required",
    "verifying you are human",
    "verificando seu navegador",
    "verificando se você é humano",
    "cf-browser-verification",
    "cf_chl_opt",
    "challenge-platform",
    "cf-challenge",
    "captcha-delivery",
    "g-recaptcha",
];

/// True when `html` looks like a challenge page rather than store content.
pub fn is_challenge_page(html: &str) -> bool {
    if html.is_empty() {
        return false;
    }
    let lower = html.to_lowercase();
    CHALLENGE_SIGNATURES.iter().any(|sig| lower.contains(sig))
}
