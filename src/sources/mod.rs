pub mod feishu;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    Unauthorized(&'static str),
    BadRequest(&'static str),
}
