//! Interstitial (age gate, consent, app nag) dismissal.

/// How to find a dismissal control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentAction {
    /// A CSS selector.
    Selector(&'static str),
    /// A button or link whose visible text matches, case-insensitively.
    ButtonText(&'static str),
}

/// Tried in order, each once. Missing controls are ignored.
pub const CONSENT_ACTIONS: &[ConsentAction] = &[
    ConsentAction::Selector("button[data-testid=\"age-gate-continue\"]"),
    ConsentAction::ButtonText("Yes"),
    ConsentAction::ButtonText("Continue"),
    ConsentAction::ButtonText("I am over 18"),
    ConsentAction::ButtonText("View NSFW content"),
    ConsentAction::ButtonText("Click to see nsfw"),
    ConsentAction::ButtonText("Not Now"),
];

/// JavaScript that clicks the control if present and evaluates to whether it did.
///
/// Walks open shadow roots, since web-component pages keep their buttons there.
pub fn click_script(action: ConsentAction) -> String {
    let (kind, needle) = match action {
        ConsentAction::Selector(s) => ("selector", s),
        ConsentAction::ButtonText(t) => ("text", t),
    };
    let needle = serde_json::Value::String(needle.to_string()).to_string();
    format!(
        r#"
    (() => {{
        const kind = '{kind}';
        const needle = {needle};
        const roots = [document];
        for (let i = 0; i < roots.length; i++) {{
            for (const el of roots[i].querySelectorAll('*')) {{
                if (el.shadowRoot) roots.push(el.shadowRoot);
            }}
        }}
        for (const root of roots) {{
            let target = null;
            if (kind === 'selector') {{
                target = root.querySelector(needle);
            }} else {{
                const want = needle.toLowerCase();
                target = Array.from(root.querySelectorAll('button, a, [role="button"]'))
                    .find(el => (el.innerText || el.textContent || '').trim().toLowerCase() === want);
            }}
            if (target) {{
                target.click();
                return true;
            }}
        }}
        return false;
    }})()
    "#
    )
}
