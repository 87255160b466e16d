use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// A `<name>.in` file with its optional `<name>.out` companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Testcase {
    name: String,
    input_path: PathBuf,
    expected_path: Option<PathBuf>,
}

impl Testcase {
    pub const INPUT_EXT: &'static str = "in";
    pub const EXPECTED_EXT: &'static str = "out";

    pub fn new(
        name: impl Into<String>,
        input_path: impl Into<PathBuf>,
        expected_path: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            input_path: input_path.into(),
            expected_path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn expected_path(&self) -> Option<&Path> {
        self.expected_path.as_deref()
    }

    /// Collects every `*.in` file directly inside `dir` (subdirs are not
    /// descended into), in judge order. A missing dir is just an empty set.
    pub fn enumerate(dir: impl AsRef<Path>) -> fsutil::Result<Vec<Self>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut res = Vec::new();
        for entry in fsutil::read_dir(dir)?.filter_map(Result::ok) {
            let Ok(ft) = entry.file_type() else {
                continue;
            };
            if ft.is_dir() {
                continue;
            }
            let input_path = entry.path();
            if input_path.extension() != Some(OsStr::new(Self::INPUT_EXT)) {
                continue;
            }
            let Some(stem) = input_path.file_stem() else {
                continue;
            };
            let name = stem.to_string_lossy().into_owned();
            let expected_path = input_path.with_extension(Self::EXPECTED_EXT);
            let expected_path = expected_path.is_file().then_some(expected_path);
            res.push(Self {
                name,
                input_path,
                expected_path,
            });
        }
        res.sort_by_cached_key(|t| (SortKey::of(&t.name), t.name.clone()));
        Ok(res)
    }
}

/// Judge order: a name containing digits sorts by the value of its first
/// digit run, number-less names sort after them as plain text, and exact
/// ties fall back to the name ("2" < "10" < "zzz").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Num(u64),
    Name(String),
}

impl SortKey {
    fn of(name: &str) -> Self {
        if let Some(start) = name.find(|c: char| c.is_ascii_digit()) {
            let digits = &name[start..];
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            // parse fails only on overflow; such a name sorts as text
            if let Ok(n) = digits[..end].parse() {
                return Self::Num(n);
            }
        }
        Self::Name(name.to_owned())
    }
}

/// One `--cases` token. An all-digit token selects by numeric value
/// ("1" matches testcase "01"), anything else by substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseSelector {
    /// Canonical digit string of an all-digit token, leading zeros stripped.
    Num(String),
    Substr(String),
}

impl CaseSelector {
    pub fn parse(token: &str) -> Self {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Num(canonical_digits(token).to_owned());
        }
        Self::Substr(token.to_owned())
    }

    pub fn matches(&self, case_name: &str) -> bool {
        match self {
            Self::Num(n) => {
                !case_name.is_empty()
                    && case_name.bytes().all(|b| b.is_ascii_digit())
                    && canonical_digits(case_name) == n.as_str()
            }
            Self::Substr(s) => case_name.contains(s.as_str()),
        }
    }
}

/// Digit string without its leading zeros ("000" stays "0"). Comparing these
/// is numeric equality at any width, no integer parse involved.
fn canonical_digits(digits: &str) -> &str {
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() {
        "0"
    } else {
        stripped
    }
}

/// Keeps the testcases matched by at least one selector; an empty selector
/// list keeps everything. Order is untouched either way.
pub fn filter_cases(cases: Vec<Testcase>, selectors: &[CaseSelector]) -> Vec<Testcase> {
    if selectors.is_empty() {
        return cases;
    }
    cases
        .into_iter()
        .filter(|t| selectors.iter().any(|s| s.matches(t.name())))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn names(cases: &[Testcase]) -> Vec<&str> {
        cases.iter().map(|t| t.name()).collect()
    }

    fn case(name: &str) -> Testcase {
        Testcase::new(name, format!("{}.in", name), None)
    }

    #[test]
    fn sort_key_should_order_by_first_digit_run_then_name() {
        let mut xs = vec!["zzz", "10", "2", "01", "1abc", "test2_part1", "b3x"];
        xs.sort_by_cached_key(|name| (SortKey::of(name), name.to_string()));
        assert_eq!(xs, vec!["01", "1abc", "2", "test2_part1", "b3x", "10", "zzz"]);
    }

    #[test]
    fn numeric_selector_should_match_by_value_not_spelling() {
        let sel = CaseSelector::parse("1");
        assert_eq!(sel, CaseSelector::Num("1".into()));
        assert!(sel.matches("01"));
        assert!(sel.matches("1"));
        assert!(!sel.matches("1abc"));
        assert!(!sel.matches("10"));

        let sel = CaseSelector::parse("000");
        assert!(sel.matches("0"));
        assert!(sel.matches("00"));
    }

    #[test]
    fn numeric_selector_should_compare_values_wider_than_u64() {
        // 21 digits; parsing as u64 would overflow
        let sel = CaseSelector::parse("999999999999999999999");
        assert_eq!(sel, CaseSelector::Num("999999999999999999999".into()));
        assert!(sel.matches("0999999999999999999999"));
        assert!(!sel.matches("999999999999999999999x"));
        assert!(!sel.matches("1999999999999999999999"));
    }

    #[test]
    fn non_numeric_token_should_match_by_substring() {
        let sel = CaseSelector::parse("sample");
        assert_eq!(sel, CaseSelector::Substr("sample".into()));
        assert!(sel.matches("sample-1"));
        assert!(!sel.matches("corner"));
    }

    #[test]
    fn filter_should_keep_only_matched_cases_in_order() {
        let cases = vec![case("01"), case("02"), case("sample-1")];
        let selectors = [CaseSelector::parse("2"), CaseSelector::parse("sample")];
        let picked = filter_cases(cases.clone(), &selectors);
        assert_eq!(names(&picked), vec!["02", "sample-1"]);

        assert_eq!(filter_cases(cases.clone(), &[]).len(), 3);
        assert!(filter_cases(cases, &[CaseSelector::parse("9")]).is_empty());
    }

    #[test]
    fn enumerate_should_pair_inputs_with_optional_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        fs::write(d.join("2.in"), "").unwrap();
        fs::write(d.join("2.out"), "").unwrap();
        fs::write(d.join("10.in"), "").unwrap();
        fs::write(d.join("10.ans"), "").unwrap();
        fs::write(d.join("a.in"), "").unwrap();
        fs::write(d.join("a.out"), "").unwrap();
        fs::write(d.join("notes.txt"), "").unwrap();
        fs::create_dir(d.join("nested.in")).unwrap();

        let cases = Testcase::enumerate(d).unwrap();
        assert_eq!(names(&cases), vec!["2", "10", "a"]);
        assert_eq!(cases[0].expected_path(), Some(d.join("2.out").as_path()));
        assert_eq!(cases[1].expected_path(), None);
        assert_eq!(cases[2].input_path(), d.join("a.in").as_path());
    }

    #[test]
    fn enumerate_missing_dir_should_be_empty() {
        let cases = Testcase::enumerate("/no/such/dir/anywhere").unwrap();
        assert!(cases.is_empty());
    }
}
