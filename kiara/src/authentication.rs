//! Login through the itsme identity provider.
//!
//! Only the phone-confirmation path is supported: the phone number is
//! submitted and the user confirms the login on their device while the run
//! waits for the browser to land back on the site.

use regex::escape;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::errors::{KiaraError, KiaraResult};
use crate::orchestrator::Settings;
use crate::selector::Selector;
use crate::surface::UrlPattern;
use crate::Page;

pub const AUTH_METHOD: &str = "itsme";
const PHONE_INPUT: &str = "input[type=\"tel\"]";
const SEND_BUTTON: &str = "Versturen";
const METHOD_TIMEOUT: Duration = Duration::from_secs(15);

/// Whether the page is somewhere other than the site, i.e. on a login page
/// or blank.
pub async fn needs_authentication(page: &Page, settings: &Settings) -> KiaraResult<bool> {
    let url = page
        .current_url()
        .await
        .map_err(|e| KiaraError::navigation("current page", e))?;
    Ok(!url.starts_with(&settings.base_url))
}

/// Log in with the given phone number and wait until the user has
/// confirmed on their device.
#[instrument(skip(page, settings, phone_number), fields(base_url = %settings.base_url))]
pub async fn run_authentication_flow(
    page: &Page,
    settings: &Settings,
    phone_number: &str,
) -> KiaraResult<()> {
    info!("Running authentication flow");

    page.goto(&settings.base_url)
        .await
        .map_err(|e| KiaraError::navigation(settings.base_url.clone(), e))?;

    info!("Selecting authentication method: '{AUTH_METHOD}'");
    page.get_by_role("button", AUTH_METHOD, false)
        .set_default_timeout(METHOD_TIMEOUT)
        .click()
        .await
        .map_err(|e| KiaraError::navigation(format!("authentication method '{AUTH_METHOD}'"), e))?;

    info!("Authenticating with MFA using phone number: '{phone_number}'");
    page.locator(Selector::css(PHONE_INPUT))
        .fill(phone_number)
        .await
        .map_err(|source| KiaraError::BrowserFillCell {
            target: "phone number".to_string(),
            source,
        })?;

    page.get_by_role("button", SEND_BUTTON, false)
        .set_default_timeout(METHOD_TIMEOUT)
        .click()
        .await
        .map_err(|e| KiaraError::navigation("trigger MFA button", e))?;
    info!("Triggered MFA prompt, confirm the login on your phone");

    let back_on_site = site_pattern(&settings.base_url)?;
    page.wait_for_url(&back_on_site, Some(settings.auth_timeout))
        .await
        .map_err(|e| {
            warn!("Login was not confirmed within {:?}", settings.auth_timeout);
            KiaraError::navigation("login confirmation", e)
        })?;

    info!("Authenticated");
    Ok(())
}

fn site_pattern(base_url: &str) -> KiaraResult<UrlPattern> {
    UrlPattern::regex(&format!("^{}", escape(base_url)))
        .map_err(|e| KiaraError::MalformedPage(format!("invalid base url '{base_url}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::site_pattern;

    #[test]
    fn site_pattern_anchors_on_base_url() {
        let pattern = site_pattern("https://kiara.vlaanderen.be").unwrap();
        assert!(pattern.matches("https://kiara.vlaanderen.be/Kiara/secure/home.do"));
        assert!(!pattern.matches("https://idp.itsme.be/?return=https://kiara.vlaanderen.be"));
        assert!(!pattern.matches("https://kiaraxvlaanderen.be"));
    }
}
