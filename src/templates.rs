pub const SUITE_JSON: &str = include_str!("../templates/suite.json");
