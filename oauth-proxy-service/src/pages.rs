//! # HTML Pages
//!
//! The consent page is the only server-rendered HTML; the landing and
//! invalid-token pages are static files. Every transaction-derived value
//! is escaped before interpolation — the consent page renders data that
//! originated in query parameters of an unauthenticated endpoint.

use crate::domain::entities::AuthorizationTransaction;

/// Application name shown on the consent screen.
const APP_NAME: &str = "Model Context Protocol (MCP) Host Application";

/// Upstream provider name shown on the consent screen.
const UPSTREAM_PROVIDER: &str = "Zoho Accounts";

/// Served with a 401 when `/authorize` is called with an unknown
/// client_id. Embedded so the response does not depend on the working
/// directory; the same file is also served under `/static/`.
pub const INVALID_TOKEN_HTML: &str = include_str!("../static/invalid_token.html");

/// Minimal HTML escaping for text and attribute positions.
pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders the consent page with hidden `transaction_id` and `csrf_token`
/// fields feeding the approve/deny forms.
pub fn consent_page(transaction: &AuthorizationTransaction, csrf_token: &str) -> String {
    let transaction_id = html_escape(&transaction.transaction_id);
    let client_id = html_escape(&transaction.client_id);
    let scope = html_escape(&transaction.scope);
    let csrf_token = html_escape(csrf_token);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Authorize Access</title>
    <style>
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background-color: #f4f7f6;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
        }}
        .container {{
            max-width: 500px;
            width: 90%;
            background-color: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 4px 12px rgba(0, 0, 0, 0.1);
        }}
        h1 {{
            color: #333;
            font-size: 24px;
            border-bottom: 2px solid #eee;
            padding-bottom: 10px;
            margin-bottom: 20px;
        }}
        .details-table {{
            width: 100%;
            border-collapse: collapse;
            margin-bottom: 30px;
        }}
        .details-table th, .details-table td {{
            padding: 12px;
            text-align: left;
            border-bottom: 1px solid #ddd;
        }}
        .details-table th {{
            background-color: #eef;
            color: #555;
            font-weight: 600;
            width: 40%;
        }}
        .details-table td {{
            color: #333;
            word-break: break-word;
        }}
        .consent-message {{
            background-color: #ffffe0;
            border-left: 5px solid #ffcc00;
            padding: 15px;
            margin-bottom: 20px;
            color: #666;
        }}
        .actions {{
            display: flex;
            justify-content: flex-end;
            gap: 10px;
        }}
        button {{
            padding: 10px 25px;
            border: none;
            border-radius: 5px;
            font-size: 16px;
            cursor: pointer;
        }}
        .approve {{
            background-color: #007bff;
            color: white;
        }}
        .deny {{
            background-color: #e9ecef;
            color: #333;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Authorize Access</h1>

        <p class="consent-message">
            The {APP_NAME} application is requesting access to your data.
            By approving, you authorize this proxy to initiate the login process
            with your {UPSTREAM_PROVIDER} account.
        </p>

        <table class="details-table">
            <tr><th>Application</th><td>{APP_NAME}</td></tr>
            <tr><th>Requested Scope</th><td>{scope}</td></tr>
            <tr><th>Upstream Provider</th><td>{UPSTREAM_PROVIDER}</td></tr>
            <tr><th>Client ID (MCP)</th><td><small>{client_id}</small></td></tr>
        </table>

        <div class="actions">
            <form action="/consent/deny" method="post">
                <input type="hidden" name="transaction_id" value="{transaction_id}">
                <input type="hidden" name="csrf_token" value="{csrf_token}">
                <button type="submit" class="deny">Deny</button>
            </form>
            <form action="/consent/approve" method="post">
                <input type="hidden" name="transaction_id" value="{transaction_id}">
                <input type="hidden" name="csrf_token" value="{csrf_token}">
                <button type="submit" class="approve">Approve and Continue</button>
            </form>
        </div>
    </div>
</body>
</html>
"#
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn transaction(scope: &str) -> AuthorizationTransaction {
        AuthorizationTransaction {
            transaction_id: "txn-1".into(),
            client_id: "client-1".into(),
            redirect_uri: "https://c/cb".into(),
            scope: scope.into(),
            state: None,
            code_challenge: None,
            code_challenge_method: None,
            created_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_html_escape_covers_markup_characters() {
        assert_eq!(
            html_escape(r#"<script>alert("x&y")</script>"#),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;"
        );
        assert_eq!(html_escape("it's"), "it&#x27;s");
        assert_eq!(html_escape("plain"), "plain");
    }

    #[test]
    fn test_consent_page_carries_hidden_fields() {
        let html = consent_page(&transaction("scope-a"), "csrf-123");

        assert!(html.contains(r#"name="transaction_id" value="txn-1""#));
        assert!(html.contains(r#"name="csrf_token" value="csrf-123""#));
        assert!(html.contains(r#"action="/consent/approve""#));
        assert!(html.contains(r#"action="/consent/deny""#));
    }

    #[test]
    fn test_consent_page_escapes_transaction_fields() {
        let html = consent_page(&transaction(r#""><script>steal()</script>"#), "t");

        assert!(!html.contains("<script>steal()"));
        assert!(html.contains("&lt;script&gt;steal()"));
    }
}
