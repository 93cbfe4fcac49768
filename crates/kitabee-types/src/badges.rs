/// Unlock condition of a badge. Every rule is a threshold over one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeRule {
    WishlistCount(u32),
    LibraryCount(u32),
    /// At least `count` library entries added during the last `days` days.
    RecentLibraryCount { count: u32, days: u32 },
    AcceptedFriends(u32),
    HasAvatar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeDefinition {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub rule: BadgeRule,
}

/// Evaluation order of the badge engine. Seeded into the `badges` table at startup.
pub const CATALOG: &[BadgeDefinition] = &[
    BadgeDefinition {
        code: "WISH_1",
        name: "Dreamer",
        description: "Add a first book to your wishlist",
        icon: "wish-1",
        rule: BadgeRule::WishlistCount(1),
    },
    BadgeDefinition {
        code: "WISH_10",
        name: "Big Plans",
        description: "Keep 10 books on your wishlist",
        icon: "wish-10",
        rule: BadgeRule::WishlistCount(10),
    },
    BadgeDefinition {
        code: "READ_1",
        name: "First Chapter",
        description: "Add a first book to your library",
        icon: "read-1",
        rule: BadgeRule::LibraryCount(1),
    },
    BadgeDefinition {
        code: "READ_10",
        name: "Bookworm",
        description: "Have 10 books in your library",
        icon: "read-10",
        rule: BadgeRule::LibraryCount(10),
    },
    BadgeDefinition {
        code: "READ_50",
        name: "Librarian",
        description: "Have 50 books in your library",
        icon: "read-50",
        rule: BadgeRule::LibraryCount(50),
    },
    BadgeDefinition {
        code: "MONTHLY_5",
        name: "Marathon Reader",
        description: "Add 5 books to your library within 30 days",
        icon: "monthly-5",
        rule: BadgeRule::RecentLibraryCount { count: 5, days: 30 },
    },
    BadgeDefinition {
        code: "FRIEND_1",
        name: "Reading Buddy",
        description: "Make a first friend",
        icon: "friend-1",
        rule: BadgeRule::AcceptedFriends(1),
    },
    BadgeDefinition {
        code: "FRIEND_10",
        name: "Book Circle",
        description: "Have 10 friends",
        icon: "friend-10",
        rule: BadgeRule::AcceptedFriends(10),
    },
    BadgeDefinition {
        code: "AVATAR",
        name: "New Look",
        description: "Pick an avatar",
        icon: "avatar",
        rule: BadgeRule::HasAvatar,
    },
];
