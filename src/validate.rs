use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::Error;
use crate::Result;

/// Repository name grammar:
/// `[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*`
static REPOSITORY_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*$")
        .expect("repository name regex is valid")
});

pub fn validate_repository_name(name: &str) -> Result<()> {
    if REPOSITORY_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidRepositoryName(name.to_string()))
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::simple("alpine", true)]
    #[case::namespaced("library/alpine", true)]
    #[case::with_dots_and_dashes("my-repo.v1_2", true)]
    #[case::uppercase("Alpine", false)]
    #[case::leading_slash("/alpine", false)]
    #[case::trailing_slash("alpine/", false)]
    #[case::empty("", false)]
    fn validates_repository_name_grammar(#[case] name: &str, #[case] expected_ok: bool) {
        assert_eq!(validate_repository_name(name).is_ok(), expected_ok);
    }
}
