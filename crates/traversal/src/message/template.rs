//! Fixed SIP message skeletons and the placeholder substitution that renders them.
//!
//! Each skeleton is compiled once into literal and field segments. Rendering is a
//! straight concatenation into one contiguous buffer, so the caller can hand the
//! whole message to the socket in a single write.

use bytes::{Bytes, BytesMut};
use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::message::extract::HeaderLine;

const SIP_REQUEST: &str = "REGISTER sip:example.org;transport=TCP SIP/2.0\r\n\
Via: SIP/2.0/TCP {{ LocalIP }}:{{ RemotePort }};branch=I9hG4bK-d8754z-c2ac7de1b3ce90f7-1---d8754z-;rport;transport=TCP\r\n\
Max-Forwards: 70\r\n\
Contact: <sip:wuzzi@{{ LocalIP }}:{{ LocalPort }};rinstance=v40f3f83b335139c;transport=TCP>\r\n\
To: <sip:wuzzi@example.org;transport=TCP>\r\n\
From: <sip:wuzzi@example.org;transport=TCP>;tag=U7c3d519\r\n\
Call-ID: aaaaaaaaaaaaaaaaa0404aaaaaaaaaaaabbbbbbZjQ4M2M.\r\n\
CSeq: 1 REGISTER\r\n\
Expires: 60\r\n\
Allow: REGISTER, INVITE, ACK, CANCEL, BYE, NOTIFY, REFER, MESSAGE, OPTIONS, INFO, SUBSCRIBE\r\n\
Supported: replaces, norefersub, extended-refer, timer, X-cisco-serviceuri\r\n\
Allow-Events: presence, kpml\r\n\
Content-Length: 0\r\n\
\r\n";

const SIP_RESPONSE: &str = "SIP/2.0 200 OK\r\n\
{{ Via }};received=0.0.0.0\r\n\
From: <sip:wuzzi@example.org;transport=TCP>;tag=U7c3d519\r\n\
To: <sip:wuzzi@example.org;transport=TCP>;tag=37GkEhwl6\r\n\
Call-ID: aaaaaaaaaaaaaaaaa0404aaaaaaaaaaaabbbbbbZjQ4M2M.\r\n\
CSeq: 1 REGISTER\r\n\
{{ Contact }};expires=3600\r\n\
Content-Length: 0\r\n\
\r\n";

const REQUEST_FIELDS: &[&str] = &["LocalIP", "LocalPort", "RemotePort"];
const RESPONSE_FIELDS: &[&str] = &["Via", "Contact"];

// Compilation errors are kept as strings so the statics stay shareable.
static REQUEST_TEMPLATE: Lazy<std::result::Result<Template, String>> = Lazy::new(|| {
    Template::compile("sip_request", SIP_REQUEST, REQUEST_FIELDS).map_err(|e| e.to_string())
});

static RESPONSE_TEMPLATE: Lazy<std::result::Result<Template, String>> = Lazy::new(|| {
    Template::compile("sip_response", SIP_RESPONSE, RESPONSE_FIELDS).map_err(|e| e.to_string())
});

/// Values a template can look up by placeholder name
pub trait TemplateFields {
    fn field(&self, name: &str) -> Option<&[u8]>;
}

/// Fields substituted into the REGISTER request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub local_ip: String,
    pub local_port: String,
    pub remote_port: String,
}

impl RequestContext {
    pub fn new(
        local_ip: impl Into<String>,
        local_port: impl Into<String>,
        remote_port: impl Into<String>,
    ) -> Self {
        Self {
            local_ip: local_ip.into(),
            local_port: local_port.into(),
            remote_port: remote_port.into(),
        }
    }
}

impl TemplateFields for RequestContext {
    fn field(&self, name: &str) -> Option<&[u8]> {
        match name {
            "LocalIP" => Some(self.local_ip.as_bytes()),
            "LocalPort" => Some(self.local_port.as_bytes()),
            "RemotePort" => Some(self.remote_port.as_bytes()),
            _ => None,
        }
    }
}

/// Header lines echoed back into the 200 OK
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseContext {
    pub via: HeaderLine,
    pub contact: HeaderLine,
}

impl TemplateFields for ResponseContext {
    fn field(&self, name: &str) -> Option<&[u8]> {
        match name {
            "Via" => Some(self.via.as_bytes()),
            "Contact" => Some(self.contact.as_bytes()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A compiled message skeleton
#[derive(Debug, Clone)]
pub struct Template {
    name: &'static str,
    segments: Vec<Segment>,
    literal_len: usize,
}

impl Template {
    /// Compile `source`, accepting only `{{ Name }}` placeholders whose name is in `fields`.
    pub fn compile(name: &'static str, source: &str, fields: &[&str]) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal_len = 0;
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                literal_len += start;
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                Error::Template(format!("{}: unterminated placeholder", name))
            })?;

            let field = after[..end].trim();
            if field.is_empty() {
                return Err(Error::Template(format!("{}: empty placeholder", name)));
            }
            if !fields.contains(&field) {
                return Err(Error::Template(format!(
                    "{}: unknown field `{}`",
                    name, field
                )));
            }

            segments.push(Segment::Field(field.to_string()));
            rest = &after[end + 2..];
        }

        if !rest.is_empty() {
            literal_len += rest.len();
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            name,
            segments,
            literal_len,
        })
    }

    /// Render into a single contiguous buffer. Values are copied verbatim.
    pub fn render<C: TemplateFields + ?Sized>(&self, ctx: &C) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.literal_len + 128);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => buf.extend_from_slice(text.as_bytes()),
                Segment::Field(field) => {
                    let value = ctx.field(field).ok_or_else(|| {
                        Error::Template(format!("{}: no value for `{}`", self.name, field))
                    })?;
                    buf.extend_from_slice(value);
                }
            }
        }

        Ok(buf.freeze())
    }
}

fn compiled(
    template: &'static Lazy<std::result::Result<Template, String>>,
) -> Result<&'static Template> {
    Lazy::force(template)
        .as_ref()
        .map_err(|e| Error::Template(e.clone()))
}

/// Compile both skeletons now so a malformed template fails at startup.
pub fn precompile() -> Result<()> {
    compiled(&REQUEST_TEMPLATE)?;
    compiled(&RESPONSE_TEMPLATE)?;
    Ok(())
}

/// Render the REGISTER request sent by the initiator.
pub fn render_request(ctx: &RequestContext) -> Result<Bytes> {
    compiled(&REQUEST_TEMPLATE)?.render(ctx)
}

/// Render the 200 OK sent back by the responder.
pub fn render_response(ctx: &ResponseContext) -> Result<Bytes> {
    compiled(&RESPONSE_TEMPLATE)?.render(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::extract::{extract_contact, extract_via};

    fn request_ctx() -> RequestContext {
        RequestContext::new("192.168.0.20", "4444", "5060")
    }

    #[test]
    fn skeletons_compile() {
        precompile().unwrap();
    }

    #[test]
    fn request_starts_with_register_line() {
        let rendered = render_request(&request_ctx()).unwrap();
        assert!(rendered.starts_with(b"REGISTER sip:example.org;transport=TCP SIP/2.0\r\n"));
        assert!(rendered.ends_with(b"Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn request_substitutes_every_field() {
        let rendered = render_request(&request_ctx()).unwrap();
        let text = std::str::from_utf8(&rendered).unwrap();

        assert!(text.contains(
            "Via: SIP/2.0/TCP 192.168.0.20:5060;branch=I9hG4bK-d8754z-c2ac7de1b3ce90f7-1---d8754z-;rport;transport=TCP\r\n"
        ));
        assert!(text.contains(
            "Contact: <sip:wuzzi@192.168.0.20:4444;rinstance=v40f3f83b335139c;transport=TCP>\r\n"
        ));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn request_has_single_terminator() {
        let rendered = render_request(&request_ctx()).unwrap();
        let text = std::str::from_utf8(&rendered).unwrap();
        assert_eq!(text.matches("\r\n\r\n").count(), 1);
        assert_eq!(text.lines().filter(|l| l.is_empty()).count(), 1);
    }

    #[test]
    fn response_echoes_request_headers() {
        let request = render_request(&request_ctx()).unwrap();
        let ctx = ResponseContext {
            via: extract_via(&request).unwrap(),
            contact: extract_contact(&request).unwrap(),
        };

        let response = render_response(&ctx).unwrap();
        let text = std::str::from_utf8(&response).unwrap();

        assert!(text.starts_with("SIP/2.0 200 OK\r\nVia: SIP/2.0/TCP 192.168.0.20:5060;"));
        assert!(text.contains(";rport;transport=TCP;received=0.0.0.0\r\n"));
        assert!(text.contains(
            "Contact: <sip:wuzzi@192.168.0.20:4444;rinstance=v40f3f83b335139c;transport=TCP>;expires=3600\r\n"
        ));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn response_copies_header_bytes_verbatim() {
        let raw = b"Via: SIP/2.0/TCP a:1;x=\xff\r\nContact: \"Jos\xE9\" <sip:w@a:2>\r\n\r\n";
        let ctx = ResponseContext {
            via: extract_via(raw).unwrap(),
            contact: extract_contact(raw).unwrap(),
        };

        let response = render_response(&ctx).unwrap();
        let expected: &[u8] = b"SIP/2.0 200 OK\r\nVia: SIP/2.0/TCP a:1;x=\xff;received=0.0.0.0\r\n";
        assert!(response.starts_with(expected));
        let contact: &[u8] = b"\r\nContact: \"Jos\xE9\" <sip:w@a:2>;expires=3600\r\n";
        assert!(response.windows(contact.len()).any(|w| w == contact));
    }

    #[test]
    fn values_are_not_validated() {
        let ctx = RequestContext::new("not an ip", "port?", "");
        let rendered = render_request(&ctx).unwrap();
        let text = std::str::from_utf8(&rendered).unwrap();
        assert!(text.contains("Via: SIP/2.0/TCP not an ip:;branch="));
        assert!(text.contains("<sip:wuzzi@not an ip:port?;rinstance="));
    }

    #[test]
    fn compile_rejects_unterminated_placeholder() {
        let err = Template::compile("broken", "Via: {{ Via\r\n", &["Via"]).unwrap_err();
        assert!(matches!(err, Error::Template(ref m) if m.contains("unterminated")));
    }

    #[test]
    fn compile_rejects_unknown_field() {
        let err = Template::compile("broken", "{{ Route }}\r\n", &["Via"]).unwrap_err();
        assert!(matches!(err, Error::Template(ref m) if m.contains("Route")));
    }

    #[test]
    fn compile_rejects_empty_placeholder() {
        let err = Template::compile("broken", "a {{  }} b", &["Via"]).unwrap_err();
        assert!(matches!(err, Error::Template(ref m) if m.contains("empty")));
    }

    #[test]
    fn render_reports_missing_value() {
        struct Nothing;
        impl TemplateFields for Nothing {
            fn field(&self, _name: &str) -> Option<&[u8]> {
                None
            }
        }

        let template = Template::compile("t", "x={{ Via }}", &["Via"]).unwrap();
        let err = template.render(&Nothing).unwrap_err();
        assert!(matches!(err, Error::Template(ref m) if m.starts_with("t: ")));
    }

    #[test]
    fn adjacent_placeholders_render_in_order() {
        let template = Template::compile(
            "t",
            "{{LocalIP}}{{ LocalPort }}|{{RemotePort}}",
            REQUEST_FIELDS,
        )
        .unwrap();
        let rendered = template.render(&RequestContext::new("a", "b", "c")).unwrap();
        assert_eq!(&rendered[..], b"ab|c");
    }
}
