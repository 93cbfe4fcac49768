use kitabee_db::Database;
use kitabee_db::notifications::FanoutOutcome;
use kitabee_types::models::{ClubRole, NotificationKind};

fn signup(db: &Database, login: &str) -> i64 {
    let (id, token) = db
        .create_user(login, &format!("{login}@example.com"), "hash")
        .unwrap()
        .unwrap();
    assert!(db.activate_user(&token).unwrap());
    id
}

#[test]
fn invite_accept_and_talk() {
    let db = Database::open_in_memory().unwrap();
    let owner = signup(&db, "owner");
    let x = signup(&db, "xavier");

    let club = db.create_club(owner, "Sci-Fi Club", None).unwrap().unwrap();
    let members = db.list_members(club, owner).unwrap().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].role, ClubRole::Owner);

    assert!(db.invite_to_club(club, owner, x).unwrap());
    let invites = db.list_pending_invites(x).unwrap();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].kind, NotificationKind::ClubInvite);
    assert!(db.get_club(club, x).unwrap().is_none());

    assert!(db.accept_invite(x, club).unwrap());
    assert_eq!(db.get_club(club, x).unwrap().unwrap().role, ClubRole::Member);
    assert!(db.list_pending_invites(x).unwrap().is_empty());
    assert!(db.list_notifications(x, 10).unwrap()[0].is_read);

    let posted = db.post_message(club, owner, "Hello").unwrap().unwrap();
    assert_eq!(posted.fanout, FanoutOutcome::Delivered(1));
    assert_eq!(db.list_messages(club, x, 50).unwrap().unwrap().len(), 1);

    let for_x = db.list_notifications(x, 10).unwrap();
    let messages: Vec<_> = for_x
        .iter()
        .filter(|n| n.kind == NotificationKind::ClubMessage)
        .collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[0].from_login, "owner");
    assert!(db.list_notifications(owner, 10).unwrap().is_empty());
    assert_eq!(db.unread_count(x).unwrap(), 1);

    let visit = db.open_club(club, x).unwrap().unwrap();
    assert_eq!(visit.unread_before, 1);
    assert_eq!(db.unread_count(x).unwrap(), 0);
}

#[test]
fn deleting_the_owner_account_removes_the_club() {
    let db = Database::open_in_memory().unwrap();
    let owner = signup(&db, "owner");
    let member = signup(&db, "member");
    let club = db.create_club(owner, "Sci-Fi Club", None).unwrap().unwrap();
    db.add_member(club, owner, member).unwrap();
    db.post_message(club, member, "bye").unwrap();

    assert!(db.delete_user(owner).unwrap());
    assert!(db.get_club(club, member).unwrap().is_none());
    assert!(db.list_clubs_for(member).unwrap().is_empty());
    assert!(db.list_notifications(member, 10).unwrap().is_empty());
}

#[test]
fn friendship_unlocks_badges_for_both_sides() {
    let db = Database::open_in_memory().unwrap();
    let a = signup(&db, "ada");
    let b = signup(&db, "bob");

    assert!(db.send_friend_request(a, b).unwrap());
    assert!(db.accept_friend_request(b, a).unwrap());

    for user in [a, b] {
        let fresh: Vec<_> = db
            .evaluate_and_unlock(user)
            .unwrap()
            .iter()
            .map(|badge| badge.code)
            .collect();
        assert_eq!(fresh, ["FRIEND_1"]);
    }
    assert_eq!(db.list_user_badges(a).unwrap()[0].code, "FRIEND_1");
}
