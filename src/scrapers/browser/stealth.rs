//! Stealth evasion scripts, registered to run before any page script.

use crate::identity::Fingerprint;

/// Fingerprint-independent patches (puppeteer-extra-plugin-stealth style).
pub(crate) const STEALTH_SCRIPTS: &[&str] = &[
    // Remove webdriver property
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Fix chrome object
    r#"
    window.chrome = {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    // Fix permissions
    r#"
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
    );
    "#,
    // Fix plugins (make it look like regular Chrome)
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ],
        configurable: true
    });
    "#,
    // Remove automation-related properties
    r#"
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    "#,
];

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Patches that must agree with the session's fingerprint.
pub(crate) fn fingerprint_script(fp: &Fingerprint) -> String {
    let primary = fp.language.split('-').next().unwrap_or("en");
    format!(
        r#"
    Object.defineProperty(navigator, 'languages', {{
        get: () => [{language}, {primary}],
        configurable: true
    }});
    Object.defineProperty(navigator, 'platform', {{
        get: () => {platform},
        configurable: true
    }});
    Object.defineProperty(navigator, 'hardwareConcurrency', {{
        get: () => 8,
        configurable: true
    }});
    const patchGl = (proto) => {{
        const getParameter = proto.getParameter;
        proto.getParameter = function(parameter) {{
            if (parameter === 37445) return {vendor};
            if (parameter === 37446) return {renderer};
            return getParameter.call(this, parameter);
        }};
    }};
    patchGl(WebGLRenderingContext.prototype);
    if (typeof WebGL2RenderingContext !== 'undefined') patchGl(WebGL2RenderingContext.prototype);
    "#,
        language = js_string(&fp.language),
        primary = js_string(primary),
        platform = js_string(&fp.platform),
        vendor = js_string(&fp.webgl_vendor),
        renderer = js_string(&fp.webgl_renderer),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_script_embeds_gpu_strings() {
        let fp = Fingerprint::for_identity("acct-1");
        let script = fingerprint_script(&fp);
        assert!(script.contains(&js_string(&fp.webgl_renderer)));
        assert!(script.contains(&js_string(&fp.platform)));
    }
}
