pub const MODEL_API_KEY_ENV_NAME: &str = "WIKIPOI_MODEL_API_KEY";

pub const DEFAULT_API_URL: &str = "https://www.muenster4you.de/w/api.php";

/// Page holding the table of all locations.
pub const DEFAULT_LIST_PAGE: &str = "Sharing/GiveBoxen";

pub const MAX_IMAGE_BYTES: usize = 10_000_000;

pub(crate) const THINK_STRIPPER: &str = r"<think>[\s\S]*</think>\s*";

pub(crate) const CODE_FENCE_STRIPPER: &str = r"^\s*```(?:json)?\s*|\s*```\s*$";

pub(crate) const CATEGORY_LIST: &str = "books, clothes, toys, electronics, kitchen_items, \
household_goods, shoes, bags, games, decorations, tools, office_supplies, plants, food, other";

pub(crate) const ANALYSIS_PROMPT: &str = r#"
Du bist ein sehr strenger Bilderkenner für Gegenstände in einer Givebox.
Kategorisiere ausschließlich wirklich erkennbare Objekte im Bild in eine der festen Kategorien:
{categories}.
Keine Halluzinationen, keine Vermutungen. Wenn etwas unklar ist, lasse es weg.
Gib pro Objekt einen prägnanten 'name' (z. B. 'Roman: Der Prozess', 'Herren-T-Shirt blau', 'Wasserkocher').
Bei Büchern mit erkennbarem Titel verwende den Titel (und optional den Autor) als 'name',
sonst eine neutrale Bezeichnung wie 'Buch' oder 'mehrere Bücher'.
Duplikate vermeiden, Titel in Originalsprache belassen.
Schätze zusätzlich den Füllstand der Givebox ('fullness') mit GENAU EINEM der Werte:
'leer', 'normal gefüllt', 'voll', 'überfüllt'.
{bbox}
Antworte ausschließlich mit einem JSON-Objekt der Form
{"items": [{"name": "...", "category": "..."{bbox_field}}], "fullness": "..."}"#;

pub(crate) const BBOX_REQUIRED: &str = "Für JEDES Objekt MUSS eine Bounding Box 'bbox' als [x, y, w, h] \
in Pixeln relativ zur oberen linken Bildecke angegeben werden.";

pub(crate) const BBOX_FORBIDDEN: &str = "Gib KEIN 'bbox'-Feld aus.";

pub(crate) const GATE_PROMPT: &str = r#"
Du bist ein sehr strenger Bilderkenner für Giveboxen.
Erkenne, ob auf dem Bild eine Givebox zu sehen ist.
Keine Halluzinationen, keine Vermutungen.
Antworte ausschließlich mit einem JSON-Objekt der Form
{"items": [{"category": "givebox_ok"}]} oder {"items": [{"category": "givebox_not_ok"}]}"#;
