//! Status codes surfaced at the reactor/handler boundary (spec §6).
//! Full reason-phrase and header serialization lives with
//! `process_request`'s response writer, not here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok,
    NotModified,
    BadRequest,
    Forbidden,
    NotFound,
    NotAllowed,
    TooLarge,
    RangeUnsatisfiable,
    InternalError,
    /// Any handler-returned value outside the known set.
    Invalid,
}

impl HttpStatus {
    pub fn code(self) -> u16 {
        match self {
            HttpStatus::Ok => 200,
            HttpStatus::NotModified => 304,
            HttpStatus::BadRequest => 400,
            HttpStatus::Forbidden => 403,
            HttpStatus::NotFound => 404,
            HttpStatus::NotAllowed => 405,
            HttpStatus::TooLarge => 413,
            HttpStatus::RangeUnsatisfiable => 416,
            HttpStatus::InternalError => 500,
            HttpStatus::Invalid => 0,
        }
    }

    pub fn from_code(code: u16) -> HttpStatus {
        match code {
            200 => HttpStatus::Ok,
            304 => HttpStatus::NotModified,
            400 => HttpStatus::BadRequest,
            403 => HttpStatus::Forbidden,
            404 => HttpStatus::NotFound,
            405 => HttpStatus::NotAllowed,
            413 => HttpStatus::TooLarge,
            416 => HttpStatus::RangeUnsatisfiable,
            500 => HttpStatus::InternalError,
            _ => HttpStatus::Invalid,
        }
    }

    /// Reason phrase, lowercase-after-first-word to match the reference
    /// table in spec §8 scenario 6 (`status_as_string(404) == "Not found"`).
    pub fn as_str(self) -> &'static str {
        match self {
            HttpStatus::Ok => "OK",
            HttpStatus::NotModified => "Not modified",
            HttpStatus::BadRequest => "Bad request",
            HttpStatus::Forbidden => "Forbidden",
            HttpStatus::NotFound => "Not found",
            HttpStatus::NotAllowed => "Not allowed",
            HttpStatus::TooLarge => "Request too large",
            HttpStatus::RangeUnsatisfiable => "Range unsatisfiable",
            HttpStatus::InternalError => "Internal server error",
            HttpStatus::Invalid => "Invalid",
        }
    }
}

/// `status_as_string(404) == "Not found"`; `status_as_string(999) ==
/// "Invalid"` (spec §8 scenario 6).
pub fn status_as_string(code: u16) -> &'static str {
    HttpStatus::from_code(code).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_codes() {
        assert_eq!(status_as_string(404), "Not found");
        assert_eq!(status_as_string(999), "Invalid");
        assert_eq!(status_as_string(200), "OK");
    }

    #[test]
    fn round_trips_known_codes() {
        for status in [
            HttpStatus::Ok,
            HttpStatus::NotModified,
            HttpStatus::BadRequest,
            HttpStatus::Forbidden,
            HttpStatus::NotFound,
            HttpStatus::NotAllowed,
            HttpStatus::TooLarge,
            HttpStatus::RangeUnsatisfiable,
            HttpStatus::InternalError,
        ] {
            assert_eq!(HttpStatus::from_code(status.code()), status);
        }
    }
}
