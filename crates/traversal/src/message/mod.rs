//! The single SIP dialog this tool speaks: one REGISTER and its 200 OK.

pub mod extract;
pub mod template;

pub use extract::{
    extract_callback, extract_contact, extract_via, CallbackAddress, HeaderLine, MissingField,
};
pub use template::{
    precompile, render_request, render_response, RequestContext, ResponseContext, Template,
    TemplateFields,
};
