use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub organization_prefix: String,
    /// Append a random number to concurrent-mode names
    pub randomize_suffix: bool,
    /// Exclusive upper bound of the random suffix
    pub suffix_range: u32,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            organization_prefix: "org".to_string(),
            randomize_suffix: true,
            suffix_range: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingScheme {
    /// `<parent>-<tier>-<index>-<random>`, names derived from the parent's name
    Unique,
    /// `org-1`, `project-1`, `app-1`, `user-1-org-1`
    Sequential,
}

/// Display names for synthesized nodes. Indices are 1-based.
///
/// The random suffix lowers the odds of a collision with names left behind by
/// earlier runs; it does not rule them out.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    config: NamingConfig,
    scheme: NamingScheme,
}

impl NameGenerator {
    pub fn new(config: NamingConfig, scheme: NamingScheme) -> Self {
        Self { config, scheme }
    }

    pub fn scheme(&self) -> NamingScheme {
        self.scheme
    }

    pub fn organization(&self, index: usize) -> String {
        match self.scheme {
            NamingScheme::Unique => self.unique(&self.config.organization_prefix, index),
            NamingScheme::Sequential => format!("{}-{}", self.config.organization_prefix, index),
        }
    }

    pub fn project(&self, org_name: &str, index: usize) -> String {
        match self.scheme {
            NamingScheme::Unique => self.unique(&format!("{}-project", org_name), index),
            NamingScheme::Sequential => format!("project-{}", index),
        }
    }

    pub fn application(&self, project_name: &str, index: usize) -> String {
        match self.scheme {
            NamingScheme::Unique => self.unique(&format!("{}-app", project_name), index),
            NamingScheme::Sequential => format!("app-{}", index),
        }
    }

    /// `org_index` is only used by the sequential scheme.
    pub fn username(&self, org_name: &str, org_index: usize, index: usize) -> String {
        match self.scheme {
            NamingScheme::Unique => self.unique(&format!("{}-user", org_name), index),
            NamingScheme::Sequential => format!("user-{}-org-{}", index, org_index),
        }
    }

    fn unique(&self, base: &str, index: usize) -> String {
        if !self.config.randomize_suffix || self.config.suffix_range == 0 {
            return format!("{}-{}", base, index);
        }
        let suffix = rand::rng().random_range(0..self.config.suffix_range);
        format!("{}-{}-{}", base, index, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_derive_from_parent() {
        let names = NameGenerator::new(NamingConfig::default(), NamingScheme::Unique);
        let org = names.organization(3);
        assert!(org.starts_with("org-3-"));

        let suffix: u32 = org.rsplit('-').next().unwrap().parse().unwrap();
        assert!(suffix < 10_000);

        let project = names.project(&org, 1);
        assert!(project.starts_with(&format!("{}-project-1-", org)));
        assert!(names.application(&project, 2).starts_with(&format!("{}-app-2-", project)));
        assert!(names.username(&org, 3, 4).starts_with(&format!("{}-user-4-", org)));
    }

    #[test]
    fn test_suffix_can_be_disabled() {
        let config = NamingConfig {
            organization_prefix: "load".to_string(),
            randomize_suffix: false,
            ..NamingConfig::default()
        };
        let names = NameGenerator::new(config, NamingScheme::Unique);
        assert_eq!(names.organization(1), "load-1");
        assert_eq!(names.project("load-1", 2), "load-1-project-2");
    }

    #[test]
    fn test_sequential_names_are_deterministic() {
        let names = NameGenerator::new(NamingConfig::default(), NamingScheme::Sequential);
        assert_eq!(names.organization(2), "org-2");
        assert_eq!(names.project("org-2", 1), "project-1");
        assert_eq!(names.application("project-1", 3), "app-3");
        assert_eq!(names.username("org-2", 2, 5), "user-5-org-2");
    }
}
