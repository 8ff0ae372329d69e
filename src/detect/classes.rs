/// Maps a detection class id to a human-readable label.
pub trait ClassNames: Send + Sync {
    fn name(&self, class_id: u32) -> &str;
}

/// Label used for ids outside the table.
pub const UNKNOWN_CLASS: &str = "unknown";

const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// The 80 COCO classes, in YOLOv5 output order.
#[derive(Clone, Copy, Debug, Default)]
pub struct CocoClasses;

impl CocoClasses {
    pub const COUNT: usize = COCO_NAMES.len();
}

impl ClassNames for CocoClasses {
    fn name(&self, class_id: u32) -> &str {
        COCO_NAMES
            .get(class_id as usize)
            .copied()
            .unwrap_or(UNKNOWN_CLASS)
    }
}
