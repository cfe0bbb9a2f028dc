//! Static compliance framework catalog (read-only reference data)

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FrameworkRequirement {
    pub code: &'static str,
    pub title: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Framework {
    pub code: &'static str,
    pub name: &'static str,
    pub requirements: &'static [FrameworkRequirement],
}

impl Framework {
    pub fn requirement(&self, code: &str) -> Option<&FrameworkRequirement> {
        self.requirements
            .iter()
            .find(|r| r.code.eq_ignore_ascii_case(code))
    }
}

const fn req(code: &'static str, title: &'static str) -> FrameworkRequirement {
    FrameworkRequirement { code, title }
}

pub static FRAMEWORKS: &[Framework] = &[
    Framework {
        code: "soc2",
        name: "SOC 2",
        requirements: &[
            req("CC1.1", "Control environment: integrity and ethical values"),
            req("CC2.1", "Information and communication: quality information"),
            req("CC3.1", "Risk assessment: specify suitable objectives"),
            req("CC5.1", "Control activities: selection and development"),
            req("CC6.1", "Logical and physical access controls"),
            req("CC6.6", "Boundary protection against external threats"),
            req("CC7.2", "System monitoring for anomalies"),
            req("CC7.3", "Security incident evaluation"),
            req("CC8.1", "Change management"),
            req("CC9.2", "Vendor and business partner risk management"),
        ],
    },
    Framework {
        code: "iso27001",
        name: "ISO 27001",
        requirements: &[
            req("A.5.1", "Policies for information security"),
            req("A.5.9", "Inventory of information and other associated assets"),
            req("A.5.15", "Access control"),
            req("A.5.19", "Information security in supplier relationships"),
            req("A.5.24", "Incident management planning and preparation"),
            req("A.6.3", "Information security awareness, education and training"),
            req("A.8.8", "Management of technical vulnerabilities"),
            req("A.8.13", "Information backup"),
            req("A.8.15", "Logging"),
            req("A.8.32", "Change management"),
        ],
    },
    Framework {
        code: "nist_csf",
        name: "NIST CSF",
        requirements: &[
            req("ID.AM-1", "Physical devices and systems are inventoried"),
            req("ID.RA-1", "Asset vulnerabilities are identified and documented"),
            req("ID.SC-2", "Suppliers and partners are assessed"),
            req("PR.AC-1", "Identities and credentials are managed"),
            req("PR.AT-1", "All users are informed and trained"),
            req("PR.DS-1", "Data-at-rest is protected"),
            req("DE.CM-1", "The network is monitored"),
            req("RS.RP-1", "Response plan is executed during or after an incident"),
            req("RC.RP-1", "Recovery plan is executed during or after an incident"),
        ],
    },
];

pub fn find_framework(code: &str) -> Option<&'static Framework> {
    FRAMEWORKS.iter().find(|f| f.code.eq_ignore_ascii_case(code))
}
