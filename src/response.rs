//! SMTP response, containing a mandatory return code and an optional text
//! message

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::result;
use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::streaming::{tag, take_until};
use nom::combinator::{opt, value};
use nom::multi::many0;
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;

/// First digit indicates severity
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Severity {
    /// 2yx
    PositiveCompletion,
    /// 3yz
    PositiveIntermediate,
    /// 4yz
    TransientNegativeCompletion,
    /// 5yz
    PermanentNegativeCompletion,
}

impl Severity {
    fn digit(self) -> u16 {
        match self {
            Severity::PositiveCompletion => 2,
            Severity::PositiveIntermediate => 3,
            Severity::TransientNegativeCompletion => 4,
            Severity::PermanentNegativeCompletion => 5,
        }
    }
}

/// Second digit
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Category {
    /// x0z
    Syntax,
    /// x1z
    Information,
    /// x2z
    Connections,
    /// x3z
    Unspecified3,
    /// x4z
    Unspecified4,
    /// x5z
    MailSystem,
}

impl Category {
    fn digit(self) -> u16 {
        match self {
            Category::Syntax => 0,
            Category::Information => 1,
            Category::Connections => 2,
            Category::Unspecified3 => 3,
            Category::Unspecified4 => 4,
            Category::MailSystem => 5,
        }
    }
}

/// The detail digit of a response code (third digit)
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Detail(pub u8);

/// Represents a 3 digit SMTP response code
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Code {
    /// First digit of the response code
    pub severity: Severity,
    /// Second digit of the response code
    pub category: Category,
    /// Third digit
    pub detail: Detail,
}

impl Code {
    /// Creates a new `Code` structure
    pub fn new(severity: Severity, category: Category, detail: Detail) -> Code {
        Code {
            severity,
            category,
            detail,
        }
    }

    /// Numeric value of the code, e.g. `250`
    pub fn value(&self) -> u16 {
        self.severity.digit() * 100 + self.category.digit() * 10 + u16::from(self.detail.0)
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.value())
    }
}

/// Contains an SMTP reply, with separated code and message
///
/// The text message is optional, only the code is mandatory
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Response {
    /// Response code
    pub code: Code,
    /// Server response string (optional)
    /// Handle multiline responses
    pub message: Vec<String>,
}

impl FromStr for Response {
    type Err = nom::error::Error<String>;

    fn from_str(s: &str) -> result::Result<Response, Self::Err> {
        match parse_response(s) {
            Ok((_, response)) => Ok(response),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(nom::error::Error::new(
                e.input.to_string(),
                e.code,
            )),
            Err(nom::Err::Incomplete(_)) => Err(nom::error::Error::new(
                s.to_string(),
                nom::error::ErrorKind::Complete,
            )),
        }
    }
}

impl Response {
    /// Creates a new `Response`
    pub fn new(code: Code, message: Vec<String>) -> Response {
        Response { code, message }
    }

    /// Tells if the response is positive
    pub fn is_positive(&self) -> bool {
        matches!(
            self.code.severity,
            Severity::PositiveCompletion | Severity::PositiveIntermediate
        )
    }

    /// Tests code equality
    pub fn has_code(&self, code: u16) -> bool {
        self.code.value() == code
    }

    /// Returns only the first word of the message if possible
    pub fn first_word(&self) -> Option<&str> {
        self.message
            .first()
            .and_then(|line| line.split_whitespace().next())
    }

    /// Returns only the line of the message if possible
    pub fn first_line(&self) -> Option<&str> {
        self.message.first().map(String::as_str)
    }
}

fn parse_code(i: &str) -> IResult<&str, Code> {
    let (i, severity) = parse_severity(i)?;
    let (i, category) = parse_category(i)?;
    let (i, detail) = parse_detail(i)?;
    Ok((
        i,
        Code {
            severity,
            category,
            detail,
        },
    ))
}

fn parse_severity(i: &str) -> IResult<&str, Severity> {
    alt((
        value(Severity::PositiveCompletion, tag("2")),
        value(Severity::PositiveIntermediate, tag("3")),
        value(Severity::TransientNegativeCompletion, tag("4")),
        value(Severity::PermanentNegativeCompletion, tag("5")),
    ))(i)
}

fn parse_category(i: &str) -> IResult<&str, Category> {
    alt((
        value(Category::Syntax, tag("0")),
        value(Category::Information, tag("1")),
        value(Category::Connections, tag("2")),
        value(Category::Unspecified3, tag("3")),
        value(Category::Unspecified4, tag("4")),
        value(Category::MailSystem, tag("5")),
    ))(i)
}

fn parse_detail(i: &str) -> IResult<&str, Detail> {
    alt((
        value(Detail(0), tag("0")),
        value(Detail(1), tag("1")),
        value(Detail(2), tag("2")),
        value(Detail(3), tag("3")),
        value(Detail(4), tag("4")),
        value(Detail(5), tag("5")),
        value(Detail(6), tag("6")),
        value(Detail(7), tag("7")),
        value(Detail(8), tag("8")),
        value(Detail(9), tag("9")),
    ))(i)
}

/// Parses one complete (possibly multiline) reply.
///
/// Returns `nom::Err::Incomplete` while the final line has not arrived yet.
pub(crate) fn parse_response(i: &str) -> IResult<&str, Response> {
    let (i, lines) = many0(tuple((
        parse_code,
        preceded(tag("-"), take_until("\r\n")),
        tag("\r\n"),
    )))(i)?;
    let (i, (last_code, last_line)) = tuple((
        parse_code,
        terminated(
            opt(preceded(tag(" "), take_until("\r\n"))),
            tag("\r\n"),
        ),
    ))(i)?;

    // Check that all codes are equal.
    if !lines.iter().all(|&(code, _, _)| code == last_code) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            "",
            nom::error::ErrorKind::Not,
        )));
    }

    // Extract text from lines, and append last line.
    let mut lines: Vec<String> = lines
        .into_iter()
        .map(|(_, text, _)| text.to_string())
        .collect();
    if let Some(text) = last_line {
        lines.push(text.to_string());
    }

    Ok((i, Response::new(last_code, lines)))
}
