//! Platform descriptor and package repository descriptors.
//!
//! The OS family is resolved once, before the catalog is built. Everything
//! downstream branches on [`OsFamily`] instead of probing the host.

use serde::Serialize;

use crate::core::error::SpecError;

pub const APT_SOURCE_NAME: &str = "apt_gitlabci";
pub const APT_COMMENT: &str = "GitlabCI Runner Repo";
pub const APT_KEY_ID: &str = "1A4C919DB987D435939638B914219A96E15E78F4";
pub const APT_KEY_SERVER: &str = "keys.gnupg.net";
pub const YUM_REPO_NAME: &str = "runner_gitlab-runner";
pub const YUM_SOURCE_REPO_NAME: &str = "runner_gitlab-runner-source";
pub const YUM_SSL_CA_CERT: &str = "/etc/pki/tls/certs/ca-bundle.crt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Debian,
    RedHat,
    /// Anything else, carrying the raw `ID` for diagnostics.
    Other(String),
}

impl OsFamily {
    pub fn as_str(&self) -> &str {
        match self {
            OsFamily::Debian => "Debian",
            OsFamily::RedHat => "RedHat",
            OsFamily::Other(id) => id,
        }
    }

    fn from_ids(id: &str, id_like: &str) -> Self {
        let candidates = std::iter::once(id).chain(id_like.split_whitespace());
        for candidate in candidates {
            match candidate {
                "debian" | "ubuntu" => return OsFamily::Debian,
                "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "ol" => {
                    return OsFamily::RedHat;
                }
                _ => {}
            }
        }
        OsFamily::Other(id.to_string())
    }
}

/// Host facts the catalog depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub family: OsFamily,
    /// Distribution id, e.g. `ubuntu`.
    pub distro_id: String,
    /// Release codename (`VERSION_CODENAME`), required for apt sources.
    pub codename: Option<String>,
}

impl Platform {
    /// Parse the contents of an `os-release` file.
    pub fn from_os_release(contents: &str) -> Self {
        let mut id = String::new();
        let mut id_like = String::new();
        let mut codename = None;
        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "ID" => id = value.to_string(),
                "ID_LIKE" => id_like = value.to_string(),
                "VERSION_CODENAME" if !value.is_empty() => codename = Some(value.to_string()),
                _ => {}
            }
        }
        Self {
            family: OsFamily::from_ids(&id, &id_like),
            distro_id: id,
            codename,
        }
    }
}

/// apt source entry, rendered to `sources.list.d/<name>.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AptSource {
    pub name: String,
    pub comment: String,
    pub location: String,
    pub release: String,
    pub repos: String,
    pub key_id: String,
    pub key_server: String,
    pub include_src: bool,
    pub include_deb: bool,
}

/// yum repository, rendered to `yum.repos.d/<name>.repo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YumRepo {
    pub name: String,
    pub descr: String,
    pub baseurl: String,
    pub enabled: bool,
    pub gpgcheck: bool,
    pub gpgkey: String,
    pub repo_gpgcheck: bool,
    pub sslcacert: String,
    pub sslverify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepoDescriptor {
    Apt(AptSource),
    Yum(YumRepo),
    /// Repository management requested on a family with no support.
    Unsupported { name: String, family: String },
}

impl RepoDescriptor {
    pub fn name(&self) -> &str {
        match self {
            RepoDescriptor::Apt(source) => &source.name,
            RepoDescriptor::Yum(repo) => &repo.name,
            RepoDescriptor::Unsupported { name, .. } => name,
        }
    }
}

/// Repository descriptors for `platform`, rooted at `base_url`.
pub fn repo_descriptors(
    platform: &Platform,
    base_url: &str,
) -> Result<Vec<RepoDescriptor>, SpecError> {
    let base = base_url.trim_end_matches('/');
    match &platform.family {
        OsFamily::Debian => {
            let release = platform.codename.clone().ok_or_else(|| SpecError::MissingFact {
                fact: "codename".to_string(),
                purpose: "apt repository management".to_string(),
            })?;
            Ok(vec![RepoDescriptor::Apt(AptSource {
                name: APT_SOURCE_NAME.to_string(),
                comment: APT_COMMENT.to_string(),
                location: format!(
                    "{base}/runner/gitlab-runner/{}/",
                    platform.distro_id.to_lowercase()
                ),
                release,
                repos: "main".to_string(),
                key_id: APT_KEY_ID.to_string(),
                key_server: APT_KEY_SERVER.to_string(),
                include_src: false,
                include_deb: true,
            })])
        }
        OsFamily::RedHat => {
            let el = format!("{base}/runner/gitlab-runner/el/$releasever");
            Ok(vec![
                yum_repo(YUM_REPO_NAME, format!("{el}/$basearch"), base),
                yum_repo(YUM_SOURCE_REPO_NAME, format!("{el}/SRPMS"), base),
            ])
        }
        OsFamily::Other(family) => Ok(vec![RepoDescriptor::Unsupported {
            name: "gitlab-runner".to_string(),
            family: family.clone(),
        }]),
    }
}

fn yum_repo(name: &str, baseurl: String, base: &str) -> RepoDescriptor {
    RepoDescriptor::Yum(YumRepo {
        name: name.to_string(),
        descr: name.to_string(),
        baseurl,
        enabled: true,
        gpgcheck: false,
        gpgkey: format!("{base}/gpg.key"),
        repo_gpgcheck: true,
        sslcacert: YUM_SSL_CA_CERT.to_string(),
        sslverify: true,
    })
}
