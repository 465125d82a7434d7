mod test_support;

use serde_json::json;
use test_support::{Sidecar, ADMIN};

#[test]
fn first_account_is_admin_and_later_signups_are_students() {
    let (mut s, _ws) = Sidecar::with_workspace("alunos-users");
    s.bootstrap_admin();

    let res = s.ok(
        "users.create",
        json!({ "uid": "u2", "displayName": "  Responsável  ", "email": "Resp@Mail.example" }),
    );
    assert_eq!(res["user"]["role"], "Student");
    assert_eq!(res["user"]["displayName"], "Responsável");
    assert_eq!(res["user"]["email"], "resp@mail.example");

    // Asking for a privileged role without an admin actor is refused.
    assert_eq!(
        s.err_code(
            "users.create",
            json!({ "uid": "u3", "displayName": "X", "email": "x@e.example", "role": "Staff" })
        ),
        "forbidden"
    );
    assert_eq!(
        s.err_code(
            "users.create",
            json!({ "uid": "u2", "displayName": "Dup", "email": "d@e.example" })
        ),
        "conflict"
    );
    assert_eq!(
        s.err_code(
            "users.create",
            json!({ "uid": "u4", "displayName": "Y", "email": "sem-arroba" })
        ),
        "bad_params"
    );
}

#[test]
fn roles_are_managed_by_admins_only() {
    let (mut s, _ws) = Sidecar::with_workspace("alunos-roles");
    s.bootstrap_admin();
    s.create_user("sec-1", "Staff");
    s.create_user("resp-1", "Guardian");

    let list = s.ok("users.list", json!({ "actorUid": ADMIN }));
    let uids: Vec<&str> = list["users"]
        .as_array()
        .expect("users")
        .iter()
        .map(|u| u["uid"].as_str().expect("uid"))
        .collect();
    assert_eq!(uids.len(), 3);
    assert!(uids.contains(&"sec-1") && uids.contains(&"resp-1"));

    assert_eq!(s.err_code("users.list", json!({ "actorUid": "sec-1" })), "forbidden");
    assert_eq!(
        s.err_code("users.setRole", json!({ "uid": "resp-1", "role": "Admin", "actorUid": "sec-1" })),
        "forbidden"
    );

    let res = s.ok(
        "users.setRole",
        json!({ "uid": "sec-1", "role": "teacher", "actorUid": ADMIN }),
    );
    assert_eq!(res["user"]["role"], "Teacher");
    assert_eq!(
        s.err_code("users.setRole", json!({ "uid": "ghost", "role": "Staff", "actorUid": ADMIN })),
        "not_found"
    );
    assert_eq!(
        s.err_code("users.setRole", json!({ "uid": "sec-1", "role": "Root", "actorUid": ADMIN })),
        "bad_params"
    );
    assert_eq!(s.ok("users.get", json!({ "uid": "sec-1" }))["user"]["role"], "Teacher");
}

#[test]
fn profile_updates_by_self_or_admin() {
    let (mut s, _ws) = Sidecar::with_workspace("alunos-profile");
    s.bootstrap_admin();
    s.create_user("prof-1", "Teacher");
    s.create_user("prof-2", "Teacher");

    let res = s.ok(
        "users.updateProfile",
        json!({ "uid": "prof-1", "displayName": "Prof. Carla", "actorUid": "prof-1" }),
    );
    assert_eq!(res["user"]["displayName"], "Prof. Carla");

    assert_eq!(
        s.err_code(
            "users.updateProfile",
            json!({ "uid": "prof-1", "displayName": "Hacked", "actorUid": "prof-2" })
        ),
        "forbidden"
    );
    s.ok(
        "users.updateProfile",
        json!({ "uid": "prof-2", "displayName": "Prof. Davi", "actorUid": ADMIN }),
    );
    assert_eq!(
        s.err_code(
            "users.updateProfile",
            json!({ "uid": "prof-2", "displayName": "   ", "actorUid": "prof-2" })
        ),
        "bad_params"
    );
    assert_eq!(s.err_code("users.get", json!({ "uid": "nobody" })), "not_found");
}

#[test]
fn last_admin_cannot_be_demoted() {
    let (mut s, _ws) = Sidecar::with_workspace("alunos-last-admin");
    s.bootstrap_admin();
    s.create_user("sec-1", "Staff");

    assert_eq!(
        s.err_code("users.setRole", json!({ "uid": ADMIN, "role": "Staff", "actorUid": ADMIN })),
        "conflict"
    );
    assert_eq!(s.ok("users.get", json!({ "uid": ADMIN }))["user"]["role"], "Admin");

    s.ok("users.setRole", json!({ "uid": "sec-1", "role": "Admin", "actorUid": ADMIN }));
    let res = s.ok(
        "users.setRole",
        json!({ "uid": ADMIN, "role": "Teacher", "actorUid": "sec-1" }),
    );
    assert_eq!(res["user"]["role"], "Teacher");
    assert_eq!(
        s.err_code("users.setRole", json!({ "uid": "sec-1", "role": "Staff", "actorUid": "sec-1" })),
        "conflict"
    );
}
