use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Admin,
    Staff,
    Teacher,
    Student,
    Guardian,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            "guardian" => Some(Role::Guardian),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Staff => "Staff",
            Role::Teacher => "Teacher",
            Role::Student => "Student",
            Role::Guardian => "Guardian",
        }
    }

    pub fn allows(self, cap: Capability) -> bool {
        match self {
            Role::Admin => true,
            Role::Staff => !matches!(
                cap,
                Capability::BulkDelete
                    | Capability::CorrectData
                    | Capability::ManageUsers
                    | Capability::ManageWorkspace
            ),
            Role::Teacher => matches!(
                cap,
                Capability::ReadStudents | Capability::UploadGrades | Capability::Reports
            ),
            Role::Student | Role::Guardian => matches!(cap, Capability::Reports),
        }
    }
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ReadStudents,
    EditStudents,
    ImportStudents,
    UploadGrades,
    Export,
    Reports,
    BulkDelete,
    CorrectData,
    ManageUsers,
    /// Workspace settings and whole-database backup/restore.
    ManageWorkspace,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ReadStudents => "readStudents",
            Capability::EditStudents => "editStudents",
            Capability::ImportStudents => "importStudents",
            Capability::UploadGrades => "uploadGrades",
            Capability::Export => "export",
            Capability::Reports => "reports",
            Capability::BulkDelete => "bulkDelete",
            Capability::CorrectData => "correctData",
            Capability::ManageUsers => "manageUsers",
            Capability::ManageWorkspace => "manageWorkspace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_is_case_insensitive_and_roundtrips() {
        for r in [Role::Admin, Role::Staff, Role::Teacher, Role::Student, Role::Guardian] {
            assert_eq!(Role::parse(r.as_str()), Some(r));
            assert_eq!(Role::parse(&r.as_str().to_uppercase()), Some(r));
        }
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn capability_matrix() {
        assert!(Role::Admin.allows(Capability::BulkDelete));
        assert!(Role::Staff.allows(Capability::ImportStudents));
        assert!(!Role::Staff.allows(Capability::BulkDelete));
        assert!(!Role::Staff.allows(Capability::ManageUsers));
        assert!(!Role::Staff.allows(Capability::ManageWorkspace));
        assert!(Role::Admin.allows(Capability::ManageWorkspace));
        assert!(Role::Teacher.allows(Capability::UploadGrades));
        assert!(!Role::Teacher.allows(Capability::EditStudents));
        assert!(Role::Guardian.allows(Capability::Reports));
        assert!(!Role::Student.allows(Capability::ReadStudents));
    }
}
