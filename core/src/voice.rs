//! TwiML responses for the telephony provider's voice webhooks

use serde_json::Value;

pub const TWIML_CONTENT_TYPE: &str = "text/xml";

/// Keys the softphone SDK has been seen to use for the dialed number
const NUMBER_KEYS: [&str; 5] = ["To", "to", "phoneNumber", "number", "DialCallTo"];

#[derive(Debug, Default, Clone)]
pub struct Twiml {
    verbs: Vec<String>,
}

impl Twiml {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: &str) -> Self {
        self.verbs
            .push(format!(r#"<Say voice="alice">{}</Say>"#, escape_xml(text)));
        self
    }

    /// Dial `number`, presenting `caller_id` when one is configured
    pub fn dial(mut self, caller_id: &str, number: &str) -> Self {
        let number = escape_xml(number);
        if caller_id.is_empty() {
            self.verbs.push(format!("<Dial>{number}</Dial>"));
        } else {
            self.verbs.push(format!(
                r#"<Dial callerId="{}">{number}</Dial>"#,
                escape_xml(caller_id)
            ));
        }
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push("<Hangup/>".to_string());
        self
    }

    pub fn render(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>{}</Response>",
            self.verbs.concat()
        )
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// First non-empty number among the known keys of a webhook body
pub fn number_from_json(body: &Value) -> Option<String> {
    NUMBER_KEYS.iter().find_map(|key| {
        body.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dial_renders_caller_id() {
        let xml = Twiml::new().dial("+493042430344", "+15551234").render();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<Dial callerId="+493042430344">+15551234</Dial>"#));
    }

    #[test]
    fn say_is_escaped() {
        let xml = Twiml::new().say("a <b> & c").hangup().render();
        assert!(xml.contains("a &lt;b&gt; &amp; c"));
        assert!(xml.ends_with("<Hangup/></Response>"));
    }

    #[test]
    fn number_lookup_order() {
        assert_eq!(
            number_from_json(&json!({"number": "+2", "To": "+1"})),
            Some("+1".to_string())
        );
        assert_eq!(
            number_from_json(&json!({"to": " ", "DialCallTo": "+3"})),
            Some("+3".to_string())
        );
        assert_eq!(number_from_json(&json!({})), None);
    }
}
