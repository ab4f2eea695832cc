use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use v_utils::log;

use crate::{
	config::AppConfig,
	is_course_url,
	page::{BrowserPage, CoursePage, js_string},
};

pub const PORTAL_URL: &str = "https://uai.unipus.cn/";

/// Only checkboxes inside the agreement block; other boxes on the page (e.g. "remember me") are not ours to tick
const AGREEMENT_CHECKBOX: &str = r#".help-block input[type="checkbox"], .agreement input[type="checkbox"]"#;

/// Landing page of a logged-in student
pub fn is_home_url(url: &str) -> bool {
	url.contains("uai.unipus.cn/home")
}

/// SSO login page or the portal's own login screen
pub fn is_login_url(url: &str) -> bool {
	url.contains("sso.unipus.cn") || url.contains("/login")
}

/// Log in through the Unipus SSO (if needed), then open the course player
pub async fn login_and_navigate(page: &Page, config: &AppConfig) -> Result<()> {
	page.goto(PORTAL_URL).await.map_err(|e| eyre!("Failed to open {PORTAL_URL}: {e}"))?;
	tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;

	let current_url = page.url().await.ok().flatten().unwrap_or_default();
	if is_home_url(&current_url) || is_course_url(&current_url) {
		log!("Already logged in");
	} else {
		// Step 1: the portal shows a landing page with a login button first
		if !is_login_url(&current_url) {
			log!("On landing page, clicking login button...");
			click_login_entry(page).await?;
			tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
		}

		// Step 2: the form refuses to submit until the agreement box is ticked
		if accept_agreement(page).await? {
			log!("Accepted user agreement");
			tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
		}

		// Step 3: credentials
		log!("Filling login form...");
		fill_and_submit_login_form(page, config).await?;
		tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

		let final_url = page.url().await.ok().flatten().unwrap_or_default();
		if is_login_url(&final_url) {
			return Err(eyre!("Login failed: still on the login page ({final_url}), check username and password"));
		}
		log!("Login complete, now at: {final_url}");
	}

	// Step 4: "I know" / "OK" dialogs that greet every new session
	let popups = BrowserPage::new(page.clone()).dismiss_popups().await?;
	if popups > 0 {
		log!("Dismissed {popups} post-login popup(s)");
		tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
	}

	log!("Navigating to course: {}", config.course_url);
	page.goto(&config.course_url).await.map_err(|e| eyre!("Failed to navigate to course URL: {e}"))?;
	tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;

	let final_url = page.url().await.ok().flatten().unwrap_or_default();
	if is_login_url(&final_url) {
		return Err(eyre!("Login failed: course URL redirected back to {final_url}"));
	}
	Ok(())
}

async fn click_login_entry(page: &Page) -> Result<()> {
	let script = r#"
		(function() {
			const candidates = document.querySelectorAll('button, a, .login-btn, .btn-login');
			for (const el of candidates) {
				const text = (el.textContent || '').replace(/\s+/g, '');
				if (text === '登录' || text.toLowerCase() === 'login' || el.classList.contains('login-btn')) {
					el.click();
					return true;
				}
			}
			return false;
		})()
	"#;
	let clicked = page.evaluate(script).await.map_err(|e| eyre!("Failed to click login button: {e}"))?;
	if !clicked.value().and_then(|v| v.as_bool()).unwrap_or(false) {
		tracing::warn!("No login button found on the landing page, assuming the form is already shown");
	}
	Ok(())
}

async fn accept_agreement(page: &Page) -> Result<bool> {
	let script = format!(
		r#"
		(function() {{
			const box = document.querySelector({});
			if (!box || box.checked) return false;
			box.click();
			return true;
		}})()
		"#,
		js_string(AGREEMENT_CHECKBOX)
	);
	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to tick agreement checkbox: {e}"))?;
	Ok(result.value().and_then(|v| v.as_bool()).unwrap_or(false))
}

/// Fill username/password and submit the login form
async fn fill_and_submit_login_form(page: &Page, config: &AppConfig) -> Result<()> {
	let fill_script = format!(
		r#"
		(function() {{
			const usernameField = document.querySelector('input[name="username"], input[placeholder*="手机号"], input[placeholder*="用户名"], input[type="text"]');
			const passwordField = document.querySelector('input[name="password"], input[type="password"]');
			if (!usernameField || !passwordField) return false;
			const setter = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, 'value').set;
			setter.call(usernameField, {});
			usernameField.dispatchEvent(new Event('input', {{ bubbles: true }}));
			setter.call(passwordField, {});
			passwordField.dispatchEvent(new Event('input', {{ bubbles: true }}));
			return true;
		}})()
		"#,
		js_string(&config.username),
		js_string(&config.password)
	);
	let filled = page.evaluate(fill_script).await.map_err(|e| eyre!("Failed to fill login form: {e}"))?;
	if !filled.value().and_then(|v| v.as_bool()).unwrap_or(false) {
		return Err(eyre!("Login form not found"));
	}
	tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

	let submit_script = r#"
		(function() {
			const buttons = document.querySelectorAll('button, input[type="submit"]');
			for (const btn of buttons) {
				const text = (btn.textContent || btn.value || '').replace(/\s+/g, '');
				if (text === '登录' || btn.type === 'submit') {
					btn.click();
					return true;
				}
			}
			const form = document.querySelector('form');
			if (form) {
				form.submit();
				return true;
			}
			return false;
		})()
	"#;
	page.evaluate(submit_script).await.map_err(|e| eyre!("Failed to submit login form: {e}"))?;

	Ok(())
}
