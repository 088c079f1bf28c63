// Symbolic platform version names (`Build.VERSION_CODES.*`)

/// Value of `VERSION_CODES.CUR_DEVELOPMENT`
const CUR_DEVELOPMENT: u32 = 10_000;

const CODENAMES: &[(&str, u32)] = &[
    ("BASE", 1),
    ("BASE_1_1", 2),
    ("CUPCAKE", 3),
    ("DONUT", 4),
    ("ECLAIR", 5),
    ("ECLAIR_0_1", 6),
    ("ECLAIR_MR1", 7),
    ("FROYO", 8),
    ("GINGERBREAD", 9),
    ("GINGERBREAD_MR1", 10),
    ("HONEYCOMB", 11),
    ("HONEYCOMB_MR1", 12),
    ("HONEYCOMB_MR2", 13),
    ("ICE_CREAM_SANDWICH", 14),
    ("ICE_CREAM_SANDWICH_MR1", 15),
    ("JELLY_BEAN", 16),
    ("JELLY_BEAN_MR1", 17),
    ("JELLY_BEAN_MR2", 18),
    ("KITKAT", 19),
    ("KITKAT_WATCH", 20),
    ("LOLLIPOP", 21),
    ("LOLLIPOP_MR1", 22),
    ("M", 23),
    ("N", 24),
    ("N_MR1", 25),
    ("O", 26),
    ("O_MR1", 27),
    ("P", 28),
    ("Q", 29),
    ("R", 30),
    ("S", 31),
    ("S_V2", 32),
    ("TIRAMISU", 33),
    ("UPSIDE_DOWN_CAKE", 34),
    ("VANILLA_ICE_CREAM", 35),
    ("BAKLAVA", 36),
    ("CUR_DEVELOPMENT", CUR_DEVELOPMENT),
];

/// API level of a `VERSION_CODES` constant name
pub fn api_level_for_codename(name: &str) -> Option<u32> {
    CODENAMES
        .iter()
        .find(|(codename, _)| *codename == name)
        .map(|(_, level)| *level)
}
