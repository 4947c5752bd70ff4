use crate::error::{JetError, Result};

/// Text connectors decode UTF-8 only
pub fn check_charset(charset: &str) -> Result<()> {
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok(()),
        _ => Err(JetError::Config(format!(
            "unsupported charset `{}`, only UTF-8 is decoded",
            charset
        ))),
    }
}

/// Strips the line terminator, `\n` or `\r\n`
pub fn trim_line_end(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::charset::{check_charset, trim_line_end};

    #[test]
    pub fn check_charset_test() {
        assert!(check_charset("UTF-8").is_ok());
        assert!(check_charset("utf8").is_ok());
        assert!(check_charset("ISO-8859-1").is_err());
    }

    #[test]
    pub fn trim_line_end_test() {
        let mut line = "abc\r\n".to_string();
        trim_line_end(&mut line);
        assert_eq!(line, "abc");

        let mut line = "abc".to_string();
        trim_line_end(&mut line);
        assert_eq!(line, "abc");
    }
}
