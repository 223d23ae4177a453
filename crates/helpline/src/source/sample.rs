//! In-process source backed by a record list
//!
//! `StaticSource::sample` serves a fixed set of IT-support solutions so the whole
//! pipeline can run without an upstream system. Records can be replaced at runtime,
//! which is how integration tests simulate upstream edits.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::RwLock;

use super::{SourceClient, SourcePage};
use crate::error::SourceError;
use crate::models::{Category, SolutionRecord};

pub struct StaticSource {
  records: RwLock<Vec<SolutionRecord>>,
  page_size: usize,
}

impl StaticSource {
  pub fn new(records: Vec<SolutionRecord>, page_size: usize) -> Self {
    Self { records: RwLock::new(records), page_size: page_size.max(1) }
  }

  /// Built-in fixture solutions, one per day starting 2024-01-01
  pub fn sample(page_size: usize) -> Self {
    Self::new(sample_records(), page_size)
  }

  /// Insert or replace a record by id
  pub fn upsert(&self, record: SolutionRecord) {
    if let Ok(mut records) = self.records.write() {
      match records.iter_mut().find(|existing| existing.id == record.id) {
        Some(existing) => *existing = record,
        None => records.push(record),
      }
    }
  }

  pub fn len(&self) -> usize {
    self.records.read().map(|records| records.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl SourceClient for StaticSource {
  fn name(&self) -> String {
    "sample".to_string()
  }

  async fn fetch_page(
    &self,
    modified_since: Option<DateTime<Utc>>,
    page_token: Option<String>,
  ) -> Result<SourcePage, SourceError> {
    let offset = match page_token.as_deref() {
      None => 0,
      Some(token) => token
        .parse::<usize>()
        .map_err(|_| SourceError::Malformed(format!("invalid page token '{token}'")))?,
    };

    let records =
      self.records.read().map_err(|_| SourceError::Unavailable("sample source lock poisoned".into()))?;

    let mut matching: Vec<SolutionRecord> = records
      .iter()
      .filter(|record| modified_since.is_none_or(|since| record.last_modified >= since))
      .cloned()
      .collect();
    matching.sort_by(|a, b| a.last_modified.cmp(&b.last_modified).then_with(|| a.id.cmp(&b.id)));

    let end = (offset + self.page_size).min(matching.len());
    let page: Vec<SolutionRecord> = matching.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
    let next_page_token = (end < matching.len()).then(|| end.to_string());

    Ok(SourcePage { records: page, rejected: Vec::new(), next_page_token })
  }
}

const SAMPLE_SOLUTIONS: &[(&str, Category, &[&str], &str)] = &[
  (
    "Password Reset Procedure",
    Category::Authentication,
    &["password", "authentication", "active-directory", "security"],
    "Step-by-step guide for IT staff to reset user passwords:\n\n\
     1. Verify user identity through secondary authentication\n\
     2. Open the Active Directory Users and Computers console\n\
     3. Locate the user account, right-click it and select 'Reset Password'\n\
     4. Generate a temporary secure password\n\
     5. Set 'User must change password at next logon'\n\
     6. Communicate the temporary password securely and document the reset in the ticket\n\n\
     Always follow company security policies.",
  ),
  (
    "Printer Connectivity Issues",
    Category::Hardware,
    &["printer", "hardware", "connectivity", "network", "troubleshooting"],
    "Troubleshooting guide for printer connectivity problems:\n\n\
     1. Check physical connections (USB or Ethernet cables)\n\
     2. Verify printer power status and display messages\n\
     3. Test network connectivity for network printers\n\
     4. Check the printer driver installation and version\n\
     5. Clear the print queue and restart the print spooler service\n\
     6. Test with a different user account to isolate permission issues\n\n\
     Use PING to test network printer reachability and look for IP address conflicts.",
  ),
  (
    "VPN Connection Problems",
    Category::Network,
    &["vpn", "network", "connectivity", "remote-access", "firewall"],
    "IT staff guide for resolving VPN connection issues:\n\n\
     1. Verify user credentials and account status\n\
     2. Check the VPN client version and install updates\n\
     3. Confirm firewall and antivirus exceptions\n\
     4. Test internet connectivity without the VPN\n\
     5. Verify the VPN server address and port settings\n\
     6. Review Windows Event Logs for VPN errors and check SSL certificates\n\n\
     Escalate server-side issues to the network team.",
  ),
  (
    "Email Client Configuration",
    Category::Email,
    &["email", "outlook", "exchange", "mobile", "configuration"],
    "Setting up email clients for end users:\n\n\
     Outlook: open File > Add Account, enter the email address and use Auto Account Setup.\n\
     Manual setup uses IMAP server.company.com port 993 with SSL and SMTP smtp.company.com \
     port 587 with TLS. Test sending and receiving, then configure calendar and contacts sync.\n\n\
     Mobile devices use Exchange ActiveSync with server mail.company.com and SSL enabled.",
  ),
  (
    "Software Installation Issues",
    Category::Software,
    &["software", "installation", "windows", "compatibility", "troubleshooting"],
    "Resolving software installation problems:\n\n\
     Check system requirements, free disk space and administrative privileges first.\n\
     Common failures include missing .NET Framework or Visual C++ redistributables, remnants \
     of previous installations, a stopped Windows Installer service, registry conflicts and \
     Group Policy software restrictions.\n\n\
     After installing, test the application, configure shortcuts and apply updates.",
  ),
  (
    "Network Drive Mapping",
    Category::Network,
    &["network-drive", "file-sharing", "group-policy", "permissions", "windows"],
    "IT guide for mapping network drives:\n\n\
     In File Explorer choose 'This PC' then 'Map network drive', pick a drive letter, enter \
     the UNC path and tick 'Reconnect at sign-in'.\n\
     For many users create a Drive Maps preference in the Group Policy Management Console \
     under User Configuration > Preferences.\n\n\
     If mapping fails verify the share is reachable and check folder permissions.",
  ),
  (
    "Blue Screen of Death (BSOD) Analysis",
    Category::Hardware,
    &["bsod", "hardware", "diagnostics", "drivers", "memory", "troubleshooting"],
    "Analyzing and resolving BSOD errors:\n\n\
     Note the STOP code and any driver names, and record how often crashes happen.\n\
     Run Windows Memory Diagnostic, check Event Viewer for critical errors and analyse dump \
     files with WinDbg. Common causes are faulty RAM, outdated drivers, overheating and power \
     supply problems.\n\n\
     Update drivers, run hardware diagnostics and replace faulty components.",
  ),
  (
    "Active Directory Account Management",
    Category::Authentication,
    &["active-directory", "user-management", "security", "powershell", "authentication"],
    "Managing user accounts in Active Directory:\n\n\
     Create users from Active Directory Users and Computers in the correct OU, set the \
     password options and add them to security groups.\n\
     Disable or enable accounts, reset passwords with forced change and manage group \
     membership. Use PowerShell and CSV imports for bulk changes.\n\n\
     Follow least privilege and audit accounts regularly.",
  ),
  (
    "Backup and Recovery Procedures",
    Category::DataManagement,
    &["backup", "recovery", "data-management", "disaster-recovery", "storage"],
    "IT staff guide for data backup and recovery:\n\n\
     Every day verify backup job completion, review backup logs, test a random file restore \
     and monitor storage capacity.\n\
     To recover, assess the scope of data loss, identify the most recent clean backup, \
     restore incrementally and verify data integrity before handing back.\n\n\
     Follow the 3-2-1 backup rule and encrypt sensitive backup data.",
  ),
  (
    "Wireless Network Troubleshooting",
    Category::Network,
    &["wifi", "wireless", "network", "connectivity", "troubleshooting", "performance"],
    "Resolving WiFi connectivity issues:\n\n\
     Check signal strength and interference, test other devices in the same spot and update \
     wireless adapter drivers. Scan for channel conflicts with a WiFi analyzer.\n\
     For authentication problems verify the network password, MAC filtering and enterprise \
     certificates. For slow networks test bandwidth and review QoS settings.\n\n\
     Check DHCP scope exhaustion and wireless controller logs for persistent issues.",
  ),
];

fn sample_records() -> Vec<SolutionRecord> {
  let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single().unwrap_or_else(Utc::now);

  SAMPLE_SOLUTIONS
    .iter()
    .enumerate()
    .map(|(i, (title, category, tags, body))| {
      let id = format!("sample-{:03}", i + 1);
      let url = format!("https://kb.example.com/solutions/{id}");
      SolutionRecord::new(id, *title, *body, *category, epoch + Duration::days(i as i64))
        .with_tags(tags.iter().copied())
        .with_url(url)
    })
    .collect()
}
