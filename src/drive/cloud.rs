use serde::Deserialize;

/// National cloud hosting the drive account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudInstance {
    /// Worldwide Microsoft cloud.
    #[default]
    Global,
    /// Microsoft cloud operated by 21Vianet.
    China,
}

impl CloudInstance {
    /// Base URL of the identity authority.
    pub fn authority_host(self) -> &'static str {
        match self {
            Self::Global => "https://login.microsoftonline.com",
            Self::China => "https://login.chinacloudapi.cn",
        }
    }

    /// Base URL of the Graph API.
    pub fn graph_api(self) -> &'static str {
        match self {
            Self::Global => "https://graph.microsoft.com",
            Self::China => "https://microsoftgraph.chinacloudapi.cn",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn china_cloud_uses_sovereign_endpoints() {
        assert_eq!(
            CloudInstance::China.authority_host(),
            "https://login.chinacloudapi.cn"
        );
        assert_eq!(
            CloudInstance::China.graph_api(),
            "https://microsoftgraph.chinacloudapi.cn"
        );
        assert_eq!(CloudInstance::default(), CloudInstance::Global);
    }
}
